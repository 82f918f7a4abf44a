//! Outgoing command framing

use crate::constants::{COMMAND_TERMINATOR, LINE_TERMINATOR};
use crate::error::{SwitchError, SwitchResult};

/// Validate that a user-provided string contains no newline characters.
///
/// Commands are line-delimited; embedded newlines would allow injection of
/// arbitrary protocol commands.
pub(crate) fn validate_no_newlines(s: &str, context: &str) -> SwitchResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(SwitchError::InvalidCommand {
            context: context.to_string(),
        });
    }
    Ok(())
}

/// Wire form of a simple command: `"{verb} {args}"` plus the terminator,
/// bare verb when args are empty.
pub(crate) fn format_command(verb: &str, args: &str) -> String {
    let mut wire = String::with_capacity(verb.len() + args.len() + COMMAND_TERMINATOR.len() + 1);
    wire.push_str(verb);
    if !args.is_empty() {
        wire.push(' ');
        wire.push_str(args);
    }
    wire.push_str(COMMAND_TERMINATOR);
    wire
}

/// A `sendmsg` request: execute a dialplan application against a channel.
///
/// `uuid` is mandatory on inbound sessions; outbound sessions may leave it
/// empty since FreeSWITCH already knows the attached channel.
#[derive(Debug, Clone, Default)]
pub struct SendMsg<'a> {
    /// Application name (`answer`, `playback`, …).
    pub app: &'a str,
    /// Application argument string, sent as a `text/plain` body when
    /// non-empty.
    pub args: &'a str,
    /// Target channel UUID; empty on outbound sessions.
    pub uuid: &'a str,
    /// Emit `event-lock: true`, serializing execution on the channel.
    pub lock: bool,
    /// Emit `loops: {n}` when greater than zero.
    pub loops: u32,
    /// Emit `async: true`, returning before the application completes.
    pub r#async: bool,
}

impl<'a> SendMsg<'a> {
    /// A minimal execute request with no optional lines.
    pub fn new(app: &'a str, args: &'a str, uuid: &'a str) -> Self {
        Self {
            app,
            args,
            uuid,
            ..Self::default()
        }
    }

    /// Validate all fields, then produce the framed wire string.
    pub(crate) fn to_wire_format(&self) -> SwitchResult<String> {
        use std::fmt::Write;

        validate_no_newlines(self.app, "sendmsg app")?;
        validate_no_newlines(self.uuid, "sendmsg uuid")?;
        // Args travel in a length-delimited body and may contain newlines.

        let mut wire = String::new();
        let _ = write!(wire, "sendmsg {}{}", self.uuid, LINE_TERMINATOR);
        let _ = write!(wire, "call-command: execute{}", LINE_TERMINATOR);
        let _ = write!(wire, "execute-app-name: {}{}", self.app, LINE_TERMINATOR);
        if self.lock {
            let _ = write!(wire, "event-lock: true{}", LINE_TERMINATOR);
        }
        if self.loops > 0 {
            let _ = write!(wire, "loops: {}{}", self.loops, LINE_TERMINATOR);
        }
        if self.r#async {
            let _ = write!(wire, "async: true{}", LINE_TERMINATOR);
        }
        if !self
            .args
            .is_empty()
        {
            let _ = write!(
                wire,
                "content-type: text/plain{}content-length: {}{}{}{}",
                LINE_TERMINATOR,
                self.args
                    .len(),
                LINE_TERMINATOR,
                LINE_TERMINATOR,
                self.args
            );
        }
        wire.push_str(COMMAND_TERMINATOR);
        Ok(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_command_wire_format() {
        assert_eq!(format_command("auth", "ClueCon"), "auth ClueCon\r\n\r\n");
        assert_eq!(
            format_command("api", "sofia status"),
            "api sofia status\r\n\r\n"
        );
        assert_eq!(format_command("connect", ""), "connect\r\n\r\n");
        assert_eq!(
            format_command("filter delete", "Event-Name HEARTBEAT"),
            "filter delete Event-Name HEARTBEAT\r\n\r\n"
        );
    }

    #[test]
    fn every_command_ends_with_crlfcrlf() {
        for wire in [
            format_command("exit", ""),
            format_command("event", "plain ALL"),
            SendMsg::new("answer", "", "abc-123")
                .to_wire_format()
                .unwrap(),
        ] {
            assert!(wire.ends_with("\r\n\r\n"), "missing terminator: {:?}", wire);
        }
    }

    #[test]
    fn sendmsg_minimal() {
        let wire = SendMsg::new("answer", "", "abc-123")
            .to_wire_format()
            .unwrap();
        assert_eq!(
            wire,
            "sendmsg abc-123\ncall-command: execute\nexecute-app-name: answer\n\r\n\r\n"
        );
    }

    #[test]
    fn sendmsg_optional_lines() {
        let msg = SendMsg {
            app: "playback",
            args: "",
            uuid: "abc-123",
            lock: true,
            loops: 3,
            r#async: true,
        };
        let wire = msg
            .to_wire_format()
            .unwrap();
        assert!(wire.contains("event-lock: true\n"));
        assert!(wire.contains("loops: 3\n"));
        assert!(wire.contains("async: true\n"));
    }

    #[test]
    fn sendmsg_omits_optional_lines_by_default() {
        let wire = SendMsg::new("answer", "", "abc-123")
            .to_wire_format()
            .unwrap();
        assert!(!wire.contains("event-lock"));
        assert!(!wire.contains("loops"));
        assert!(!wire.contains("async"));
        assert!(!wire.contains("content-type"));
    }

    #[test]
    fn sendmsg_body_block() {
        let wire = SendMsg::new("playback", "/tmp/beep.wav", "abc-123")
            .to_wire_format()
            .unwrap();
        assert!(wire.contains("content-type: text/plain\ncontent-length: 13\n\n/tmp/beep.wav"));
        assert!(wire.ends_with("/tmp/beep.wav\r\n\r\n"));
    }

    #[test]
    fn sendmsg_empty_uuid_for_outbound() {
        let wire = SendMsg::new("pre_answer", "", "")
            .to_wire_format()
            .unwrap();
        assert!(wire.starts_with("sendmsg \n"));
    }

    #[test]
    fn newline_injection_rejected() {
        assert!(validate_no_newlines("status\n\nevent plain ALL", "api").is_err());
        assert!(validate_no_newlines("bad\rvalue", "args").is_err());
        assert!(validate_no_newlines("clean value", "args").is_ok());

        let msg = SendMsg::new("answer", "", "abc\n123");
        assert!(msg
            .to_wire_format()
            .is_err());
        let msg = SendMsg::new("ans\rwer", "", "abc-123");
        assert!(msg
            .to_wire_format()
            .is_err());
    }
}

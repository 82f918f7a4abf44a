//! Dialplan application shims (`mod_dptools` verbs).
//!
//! Thin wrappers over [`EventSocket::sendmsg`]: one method per application,
//! each executing against a channel UUID. On inbound sessions the UUID is
//! mandatory; outbound sessions may pass `""` since the socket is already
//! bound to a call leg.

use crate::command::SendMsg;
use crate::error::SwitchResult;
use crate::event::Event;
use crate::socket::EventSocket;

/// Beep prompt used by `play_and_get_digits`.
const BEEP_TONE: &str = "tone_stream://%(300,200,700)";

/// Parameters for [`EventSocket::play_and_get_digits`].
///
/// Collects prompts, digit constraints and timeouts; the positional argument
/// string FreeSWITCH expects is assembled internally.
#[derive(Debug, Clone, Default)]
pub struct PlayAndGetDigits {
    /// Fewest digits to accept.
    pub min_digits: u32,
    /// Most digits to accept.
    pub max_digits: u32,
    /// Attempts before giving up.
    pub max_tries: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u32,
    /// Characters that terminate input (quoted in the argument string).
    pub terminators: String,
    /// Prompt played on invalid input; defaults to `silence_stream://150`.
    pub invalid_file: String,
    /// Channel variable receiving the collected digits.
    pub digit_var: String,
    /// Accepted digit characters; empty accepts any digit sequence.
    pub valid_digits: String,
    /// Inter-digit timeout in milliseconds; defaults to `timeout_ms`.
    pub digit_timeout_ms: Option<u32>,
    /// Target channel UUID; empty on outbound sessions.
    pub uuid: String,
    /// Whether to end the prompt with a beep.
    pub play_beep: bool,
    /// Prompt files, joined into a `file_string://` list when non-empty.
    pub sound_files: Vec<String>,
}

impl PlayAndGetDigits {
    /// The prompt play string: a beep or short silence when no files are
    /// given, otherwise `file_string://silence_stream://1!f1!…!fN[!beep]`.
    fn play_string(&self) -> String {
        if self
            .sound_files
            .is_empty()
        {
            return if self.play_beep {
                BEEP_TONE.to_string()
            } else {
                "silence_stream://10".to_string()
            };
        }

        let mut play = String::from("file_string://silence_stream://1");
        for file in &self.sound_files {
            play.push('!');
            play.push_str(file);
        }
        if self.play_beep {
            play.push('!');
            play.push_str(BEEP_TONE);
        }
        play
    }

    /// Validation regex built from the accepted digits: `(1|2|3)`, or
    /// `(\d+)` when any digits are accepted.
    fn digit_regex(&self) -> String {
        if self
            .valid_digits
            .is_empty()
        {
            return r"(\d+)".to_string();
        }
        let alternatives: Vec<String> = self
            .valid_digits
            .chars()
            .map(|c| c.to_string())
            .collect();
        format!("({})", alternatives.join("|"))
    }

    /// Positional argument string in the order the application expects.
    fn to_args(&self) -> String {
        let invalid_file = if self
            .invalid_file
            .is_empty()
        {
            "silence_stream://150"
        } else {
            &self.invalid_file
        };
        let digit_timeout = self
            .digit_timeout_ms
            .unwrap_or(self.timeout_ms);

        format!(
            "{} {} {} {} '{}' {} {} {} {} {}",
            self.min_digits,
            self.max_digits,
            self.max_tries,
            self.timeout_ms,
            self.terminators,
            self.play_string(),
            invalid_file,
            self.digit_var,
            self.digit_regex(),
            digit_timeout
        )
    }
}

impl EventSocket {
    async fn execute_app(
        &self,
        app: &str,
        args: &str,
        uuid: &str,
        lock: bool,
        loops: u32,
    ) -> SwitchResult<Event> {
        self.sendmsg(&SendMsg {
            app,
            args,
            uuid,
            lock,
            loops,
            r#async: false,
        })
        .await
    }

    /// Answer the channel.
    pub async fn answer(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("answer", "", uuid, lock, 0)
            .await
    }

    /// Answer early media without answering the call.
    pub async fn pre_answer(&self) -> SwitchResult<Event> {
        self.execute_app("pre_answer", "", "", true, 0)
            .await
    }

    /// Signal ringing to the originator.
    pub async fn ring_ready(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("ring_ready", "", uuid, lock, 0)
            .await
    }

    /// Hang up with the given cause (e.g. `NORMAL_CLEARING`).
    pub async fn hangup(&self, cause: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("hangup", cause, uuid, lock, 0)
            .await
    }

    /// Bridge the channel to a dial string
    /// (e.g. `sofia/gateway/myGW/177808`).
    pub async fn bridge(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("bridge", args, uuid, lock, 0)
            .await
    }

    /// Play a file, first setting `playback_terminators` (defaulting to
    /// `none` so stray DTMF does not stop playback).
    pub async fn playback(
        &self,
        file: &str,
        terminators: &str,
        uuid: &str,
        lock: bool,
        loops: u32,
    ) -> SwitchResult<Event> {
        let terminators = if terminators.is_empty() {
            "none"
        } else {
            terminators
        };
        self.set(&format!("playback_terminators={}", terminators), uuid, true)
            .await?;
        self.execute_app("playback", file, uuid, lock, loops)
            .await
    }

    /// Play a file forever until hangup or `uuid_break`.
    pub async fn endless_playback(
        &self,
        file: &str,
        uuid: &str,
        lock: bool,
    ) -> SwitchResult<Event> {
        self.execute_app("endless_playback", file, uuid, lock, 0)
            .await
    }

    /// Record the channel to a file, pre-setting `playback_terminators`
    /// when terminators are supplied.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        file: &str,
        time_limit_secs: &str,
        silence_thresh: &str,
        silence_hits: &str,
        terminators: &str,
        uuid: &str,
        loops: u32,
    ) -> SwitchResult<Event> {
        if !terminators.is_empty() {
            self.set(&format!("playback_terminators={}", terminators), uuid, true)
                .await?;
        }
        let args = format!(
            "{} {} {} {}",
            file, time_limit_secs, silence_thresh, silence_hits
        );
        self.execute_app("record", &args, uuid, true, loops)
            .await
    }

    /// Record the whole session in the background.
    pub async fn record_session(
        &self,
        file: &str,
        uuid: &str,
        lock: bool,
    ) -> SwitchResult<Event> {
        self.execute_app("record_session", file, uuid, lock, 0)
            .await
    }

    /// Speak text through the configured TTS engine.
    pub async fn speak(
        &self,
        text: &str,
        uuid: &str,
        lock: bool,
        loops: u32,
    ) -> SwitchResult<Event> {
        self.execute_app("speak", text, uuid, lock, loops)
            .await
    }

    /// Say a value using the module syntax
    /// (`en number pronounced 12345`).
    pub async fn say(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("say", args, uuid, lock, 0)
            .await
    }

    /// Set a channel variable (`name=value`).
    pub async fn set(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("set", args, uuid, lock, 0)
            .await
    }

    /// Unset a channel variable.
    pub async fn unset(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("unset", args, uuid, lock, 0)
            .await
    }

    /// Export a variable to the other leg on bridge.
    pub async fn export(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("export", args, uuid, lock, 0)
            .await
    }

    /// Set a global variable.
    pub async fn set_global(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("set_global", args, uuid, lock, 0)
            .await
    }

    /// Transfer the channel within the dialplan
    /// (`3222 XML default`).
    pub async fn transfer(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("transfer", args, uuid, lock, 0)
            .await
    }

    /// Attended transfer to the given endpoint (`user/1001`).
    pub async fn att_xfer(&self, url: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("att_xfer", url, uuid, lock, 0)
            .await
    }

    /// Put the channel into a conference.
    pub async fn conference(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("conference", args, uuid, lock, 0)
            .await
    }

    /// Pause the channel for the given duration.
    pub async fn sleep(&self, milliseconds: u64, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("sleep", &milliseconds.to_string(), uuid, lock, 0)
            .await
    }

    /// Wait for silence on the channel (`200 15 10 5000`).
    pub async fn wait_for_silence(
        &self,
        args: &str,
        uuid: &str,
        lock: bool,
    ) -> SwitchResult<Event> {
        self.execute_app("wait_for_silence", args, uuid, lock, 0)
            .await
    }

    /// Bind a key sequence to an application
    /// (`2 ab s record_session::/tmp/dump.gsm`).
    pub async fn bind_meta_app(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("bind_meta_app", args, uuid, lock, 0)
            .await
    }

    /// Bind a digit pattern to an action within a realm.
    pub async fn bind_digit_action(
        &self,
        args: &str,
        uuid: &str,
        lock: bool,
    ) -> SwitchResult<Event> {
        self.execute_app("bind_digit_action", args, uuid, lock, 0)
            .await
    }

    /// Switch the active digit action realm.
    pub async fn digit_action_set_realm(
        &self,
        args: &str,
        uuid: &str,
        lock: bool,
    ) -> SwitchResult<Event> {
        self.execute_app("digit_action_set_realm", args, uuid, lock, 0)
            .await
    }

    /// Clear bindings in a digit action realm.
    pub async fn clear_digit_action(
        &self,
        args: &str,
        uuid: &str,
        lock: bool,
    ) -> SwitchResult<Event> {
        self.execute_app("clear_digit_action", args, uuid, lock, 0)
            .await
    }

    /// Start inband DTMF detection.
    pub async fn start_dtmf(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("start_dtmf", "", uuid, lock, 0)
            .await
    }

    /// Stop inband DTMF detection.
    pub async fn stop_dtmf(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("stop_dtmf", "", uuid, lock, 0)
            .await
    }

    /// Start inband DTMF generation.
    pub async fn start_dtmf_generate(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("start_dtmf_generate", "true", uuid, lock, 0)
            .await
    }

    /// Stop inband DTMF generation.
    pub async fn stop_dtmf_generate(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("stop_dtmf_generate", "", uuid, lock, 0)
            .await
    }

    /// Queue digits to send once the call is bridged.
    pub async fn queue_dtmf(&self, digits: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("queue_dtmf", digits, uuid, lock, 0)
            .await
    }

    /// Discard any queued digits.
    pub async fn flush_dtmf(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("flush_dtmf", "", uuid, lock, 0)
            .await
    }

    /// Play a FreeSWITCH video file to the channel.
    pub async fn play_fsv(&self, file: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("play_fsv", file, uuid, lock, 0)
            .await
    }

    /// Record channel video to a FreeSWITCH video file.
    pub async fn record_fsv(&self, file: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("record_fsv", file, uuid, lock, 0)
            .await
    }

    /// Make every state change on the channel fire a full event.
    pub async fn verbose_events(&self, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("verbose_events", "", uuid, lock, 0)
            .await
    }

    /// Voicemail detection (`start` / `stop`).
    pub async fn vmd(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("vmd", args, uuid, lock, 0)
            .await
    }

    /// Schedule a hangup (`+60 ALLOTTED_TIMEOUT`).
    pub async fn sched_hangup(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("sched_hangup", args, uuid, lock, 0)
            .await
    }

    /// Schedule a transfer (`+60 9999 XML default`).
    pub async fn sched_transfer(&self, args: &str, uuid: &str, lock: bool) -> SwitchResult<Event> {
        self.execute_app("sched_transfer", args, uuid, lock, 0)
            .await
    }

    /// Hang up every call on the server, optionally filtered
    /// (`NORMAL_CLEARING var value`).
    pub async fn hupall(&self, args: &str) -> SwitchResult<Event> {
        self.execute_app("hupall", args, "", true, 0)
            .await
    }

    /// Play prompts and collect digits into a channel variable.
    ///
    /// When prompt files are given, `playback_delimiter=!` is set first so
    /// the assembled `file_string://` list plays as one stream.
    pub async fn play_and_get_digits(&self, params: &PlayAndGetDigits) -> SwitchResult<Event> {
        if !params
            .sound_files
            .is_empty()
        {
            self.set("playback_delimiter=!", &params.uuid, true)
                .await?;
        }
        self.execute_app("play_and_get_digits", &params.to_args(), &params.uuid, true, 0)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_string_beep_only() {
        let params = PlayAndGetDigits {
            play_beep: true,
            ..Default::default()
        };
        assert_eq!(params.play_string(), "tone_stream://%(300,200,700)");
    }

    #[test]
    fn play_string_silence_without_beep() {
        let params = PlayAndGetDigits::default();
        assert_eq!(params.play_string(), "silence_stream://10");
    }

    #[test]
    fn play_string_joins_files() {
        let params = PlayAndGetDigits {
            sound_files: vec!["one.wav".into(), "two.wav".into()],
            ..Default::default()
        };
        assert_eq!(
            params.play_string(),
            "file_string://silence_stream://1!one.wav!two.wav"
        );
    }

    #[test]
    fn play_string_appends_beep_last() {
        let params = PlayAndGetDigits {
            sound_files: vec!["one.wav".into()],
            play_beep: true,
            ..Default::default()
        };
        assert_eq!(
            params.play_string(),
            "file_string://silence_stream://1!one.wav!tone_stream://%(300,200,700)"
        );
    }

    #[test]
    fn digit_regex_alternation() {
        let params = PlayAndGetDigits {
            valid_digits: "1234".into(),
            ..Default::default()
        };
        assert_eq!(params.digit_regex(), "(1|2|3|4)");
    }

    #[test]
    fn digit_regex_default() {
        let params = PlayAndGetDigits::default();
        assert_eq!(params.digit_regex(), r"(\d+)");
    }

    #[test]
    fn args_positional_order_and_defaults() {
        let params = PlayAndGetDigits {
            min_digits: 1,
            max_digits: 4,
            max_tries: 3,
            timeout_ms: 5000,
            terminators: "#".into(),
            digit_var: "input".into(),
            valid_digits: "12".into(),
            uuid: "abc-123".into(),
            ..Default::default()
        };
        assert_eq!(
            params.to_args(),
            "1 4 3 5000 '#' silence_stream://10 silence_stream://150 input (1|2) 5000"
        );
    }

    #[test]
    fn args_explicit_digit_timeout() {
        let params = PlayAndGetDigits {
            timeout_ms: 5000,
            digit_timeout_ms: Some(2000),
            ..Default::default()
        };
        assert!(params
            .to_args()
            .ends_with(" 2000"));
    }
}

use regex::Regex;

pub const POMODORO_WORK_MINUTES: u32 = 25; // Default Pomodoro work time
pub const POMODORO_BREAK_MINUTES: u32 = 5; // Default Pomodoro break time

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Work,
    Break,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Work => "WORK",
            Phase::Break => "BREAK",
            Phase::Stopped => "STOPPED",
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Phase::Work => "💼",
            Phase::Break => "☕",
            Phase::Stopped => "🛑",
        }
    }
}

/// A selectable duration: `"3"` and `"5"` are standalone minute counts,
/// `"25-5"` is the paired work+break pomodoro preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub work_seconds: u32,
    pub break_seconds: Option<u32>,
}

impl Preset {
    /// Parse a preset id: `<minutes>` or `<work>-<break>`.
    pub fn parse(id: &str) -> Option<Preset> {
        let pattern = Regex::new(r"^(\d{1,3})(?:-(\d{1,3}))?$").ok()?;
        let captures = pattern.captures(id.trim())?;
        let work_minutes: u32 = captures.get(1)?.as_str().parse().ok()?;
        if work_minutes == 0 {
            return None;
        }
        let break_seconds = match captures.get(2) {
            Some(m) => {
                let break_minutes: u32 = m.as_str().parse().ok()?;
                if break_minutes == 0 {
                    return None;
                }
                Some(break_minutes * 60)
            }
            None => None,
        };
        Some(Preset {
            work_seconds: work_minutes * 60,
            break_seconds,
        })
    }

    pub fn is_pomodoro(&self) -> bool {
        self.break_seconds.is_some()
    }
}

/// What the caller must do after a phase ran out. The state machine itself
/// performs no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The phase that just finished, for the notification message.
    pub finished: Phase,
    /// Completed work phases and completed standalone timers are logged;
    /// completed breaks never are.
    pub log_session: bool,
    /// Break duration to start immediately, for the single automatic
    /// work→break switch of a pomodoro cycle.
    pub auto_break: Option<u32>,
}

/// The timer state machine. All mutation happens through the operations
/// below; remaining time is pushed in from the countdown driver via
/// [`Session::sync_remaining`] and is ignored unless the session is running.
#[derive(Debug)]
pub struct Session {
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub pomodoro_mode: bool,
    pub has_switched_to_break: bool,
    preset: Preset,
}

impl Session {
    pub fn new(preset: Preset) -> Self {
        let mut session = Session {
            phase: Phase::Stopped,
            remaining_seconds: 0,
            is_running: false,
            pomodoro_mode: false,
            has_switched_to_break: false,
            preset,
        };
        session.select_preset(preset);
        session
    }

    /// Apply a preset: stops the timer, clears the auto-switch flag, and
    /// arms the preset's work duration. Pomodoro presets arm in `Work`,
    /// standalone presets stay `Stopped` (their label while running too).
    pub fn select_preset(&mut self, preset: Preset) {
        self.is_running = false;
        self.preset = preset;
        self.pomodoro_mode = preset.is_pomodoro();
        self.has_switched_to_break = false;
        self.phase = if self.pomodoro_mode {
            Phase::Work
        } else {
            Phase::Stopped
        };
        self.remaining_seconds = preset.work_seconds;
    }

    /// Begin (or resume) the countdown. No-op when already running.
    /// Returns whether the session transitioned to running.
    pub fn start(&mut self) -> bool {
        if self.is_running {
            return false;
        }
        if self.remaining_seconds == 0 {
            // A finished timer rearms from its preset before running again.
            let preset = self.preset;
            self.select_preset(preset);
        }
        if self.pomodoro_mode && !self.has_switched_to_break {
            self.phase = Phase::Work;
        }
        self.is_running = true;
        true
    }

    /// Stop the countdown, preserving remaining time. No-op when not running.
    pub fn pause(&mut self) -> bool {
        if !self.is_running {
            return false;
        }
        self.is_running = false;
        true
    }

    /// Back to the selected preset's nominal duration, flag cleared.
    pub fn reset(&mut self) {
        let preset = self.preset;
        self.select_preset(preset);
    }

    /// Accept a recomputed remaining value from the countdown driver.
    /// Ticks that arrive after a pause or stop are stale and ignored.
    pub fn sync_remaining(&mut self, seconds: u32) {
        if self.is_running {
            self.remaining_seconds = seconds;
        }
    }

    /// Handle countdown expiry. The work→break switch happens here at most
    /// once per cycle; everything else lands in `Stopped`.
    pub fn complete(&mut self) -> Completion {
        self.is_running = false;
        self.remaining_seconds = 0;
        let finished = self.phase;
        if self.pomodoro_mode && finished == Phase::Work && !self.has_switched_to_break {
            self.has_switched_to_break = true;
            self.phase = Phase::Break;
            self.remaining_seconds = self
                .preset
                .break_seconds
                .unwrap_or(POMODORO_BREAK_MINUTES * 60);
            return Completion {
                finished,
                log_session: true,
                auto_break: Some(self.remaining_seconds),
            };
        }
        self.phase = Phase::Stopped;
        Completion {
            finished,
            log_session: finished == Phase::Work || !self.pomodoro_mode,
            auto_break: None,
        }
    }
}

/// `MM:SS` for the display.
pub fn format_time(total_seconds: u32) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_parse_standalone() {
        let preset = Preset::parse("3").unwrap();
        assert_eq!(preset.work_seconds, 180);
        assert_eq!(preset.break_seconds, None);
        assert!(!preset.is_pomodoro());

        let preset = Preset::parse("5").unwrap();
        assert_eq!(preset.work_seconds, 300);
        assert_eq!(preset.break_seconds, None);
    }

    #[test]
    fn test_preset_parse_pomodoro() {
        let preset = Preset::parse("25-5").unwrap();
        assert_eq!(preset.work_seconds, 1500);
        assert_eq!(preset.break_seconds, Some(300));
        assert!(preset.is_pomodoro());
    }

    #[test]
    fn test_preset_parse_rejects_junk() {
        assert_eq!(Preset::parse(""), None);
        assert_eq!(Preset::parse("abc"), None);
        assert_eq!(Preset::parse("0"), None);
        assert_eq!(Preset::parse("25-0"), None);
        assert_eq!(Preset::parse("25-5-5"), None);
        assert_eq!(Preset::parse("-5"), None);
    }

    #[test]
    fn test_select_preset_arms_duration_not_running() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        session.select_preset(Preset::parse("3").unwrap());
        assert_eq!(session.remaining_seconds, 180);
        assert!(!session.is_running);
        assert_eq!(session.phase, Phase::Stopped);
        assert!(!session.pomodoro_mode);

        session.select_preset(Preset::parse("25-5").unwrap());
        assert_eq!(session.remaining_seconds, 1500);
        assert!(!session.is_running);
        assert_eq!(session.phase, Phase::Work);
        assert!(session.pomodoro_mode);
    }

    #[test]
    fn test_start_is_noop_when_running() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        assert!(session.start());
        assert!(!session.start());
        assert!(session.is_running);
    }

    #[test]
    fn test_pause_is_noop_when_stopped() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        assert!(!session.pause());
        session.start();
        assert!(session.pause());
        assert!(!session.pause());
    }

    #[test]
    fn test_pause_preserves_remaining_and_ignores_stale_ticks() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        session.start();
        session.sync_remaining(1400);
        session.pause();
        assert_eq!(session.remaining_seconds, 1400);
        // A tick queued before the pause landed must not move the value.
        session.sync_remaining(1399);
        assert_eq!(session.remaining_seconds, 1400);
    }

    #[test]
    fn test_pomodoro_cycle_switches_to_break_exactly_once() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        session.start();
        assert_eq!(session.phase, Phase::Work);

        let completion = session.complete();
        assert_eq!(completion.finished, Phase::Work);
        assert!(completion.log_session);
        assert_eq!(completion.auto_break, Some(300));
        assert_eq!(session.phase, Phase::Break);
        assert_eq!(session.remaining_seconds, 300);
        assert!(session.has_switched_to_break);
        assert!(!session.is_running);

        // The caller restarts for the break; start must not flip back to Work.
        assert!(session.start());
        assert_eq!(session.phase, Phase::Break);

        let completion = session.complete();
        assert_eq!(completion.finished, Phase::Break);
        assert!(!completion.log_session);
        assert_eq!(completion.auto_break, None);
        assert_eq!(session.phase, Phase::Stopped);
        assert!(!session.is_running);
    }

    #[test]
    fn test_pomodoro_logs_exactly_once_per_cycle() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        let mut log_calls = 0;
        session.start();
        loop {
            let completion = session.complete();
            if completion.log_session {
                log_calls += 1;
            }
            match completion.auto_break {
                Some(_) => session.start(),
                None => break,
            };
        }
        assert_eq!(log_calls, 1);
        assert_eq!(session.phase, Phase::Stopped);
    }

    #[test]
    fn test_standalone_completes_to_stopped_and_logs() {
        let mut session = Session::new(Preset::parse("3").unwrap());
        assert_eq!(session.phase, Phase::Stopped);
        assert_eq!(session.remaining_seconds, 180);

        session.start();
        assert!(session.is_running);
        // Standalone runs keep the Stopped label, as the display always did.
        assert_eq!(session.phase, Phase::Stopped);

        let completion = session.complete();
        assert_eq!(completion.finished, Phase::Stopped);
        assert!(completion.log_session);
        assert_eq!(completion.auto_break, None);
        assert_eq!(session.phase, Phase::Stopped);
        assert!(!session.is_running);
    }

    #[test]
    fn test_reset_restores_preset_duration() {
        let mut session = Session::new(Preset::parse("25-5").unwrap());
        session.start();
        session.complete(); // into break, flag set
        session.reset();
        assert_eq!(session.phase, Phase::Work);
        assert_eq!(session.remaining_seconds, 1500);
        assert!(!session.has_switched_to_break);
        assert!(!session.is_running);

        let mut session = Session::new(Preset::parse("3").unwrap());
        session.start();
        session.sync_remaining(100);
        session.pause();
        session.reset();
        assert_eq!(session.remaining_seconds, 180);
    }

    #[test]
    fn test_start_after_completion_rearms_from_preset() {
        let mut session = Session::new(Preset::parse("3").unwrap());
        session.start();
        session.complete();
        assert_eq!(session.remaining_seconds, 0);

        assert!(session.start());
        assert_eq!(session.remaining_seconds, 180);
        assert!(session.is_running);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(65), "01:05");
        assert_eq!(format_time(1500), "25:00");
    }
}

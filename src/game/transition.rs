/// Turns watched status and level transitions into timing commands
///
/// Commands come from (previous, current) pairs of the last poll, so a tick in which
/// nothing changed never produces one. Splits compare against the last level seen
/// outside of a save.

use super::profile::{GameProfile, LEVEL_WATCH, STATUS_WATCH};
use crate::memory::WatcherList;
use crate::types::{Status, TimingCommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-run toggles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub auto_start: bool,
    pub auto_reset: bool,
    pub split_on_level_change: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            auto_start: true,
            auto_reset: true,
            split_on_level_change: false,
        }
    }
}

/// Levels that may trigger a split, each with an enabled flag
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelWhitelist {
    levels: BTreeMap<String, bool>,
}

impl LevelWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every level of `profile`, enabled
    pub fn for_profile(profile: &GameProfile) -> Self {
        profile.levels.iter().map(|l| (*l, true)).collect()
    }

    pub fn set(&mut self, level: &str, enabled: bool) {
        self.levels.insert(normalize_level(level), enabled);
    }

    pub fn is_enabled(&self, level: &str) -> bool {
        self.levels
            .get(&normalize_level(level))
            .copied()
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.levels.iter().map(|(l, e)| (l.as_str(), *e))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, bool)> for LevelWhitelist {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        let mut whitelist = Self::new();
        for (level, enabled) in iter {
            whitelist.set(level.as_ref(), enabled);
        }
        whitelist
    }
}

/// Level identifiers compare trimmed and lower-cased
pub fn normalize_level(level: &str) -> String {
    level.trim().to_lowercase()
}

/// Status and level as seen by the last two polls
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// `None` before the first successful poll
    pub previous_status: Option<Status>,
    pub status: Status,
    /// `None` before the first successful poll, normalized otherwise
    pub previous_level: Option<String>,
    pub level: String,
}

impl Snapshot {
    /// Reads the `status` and `level` watchers
    ///
    /// Raw status values the engine does not know read as `Status::None`.
    pub fn from_watchers(watchers: &WatcherList) -> Self {
        let status = |v: Option<&crate::types::WatchValue>| {
            v.map(|v| v.as_i64().and_then(Status::from_raw).unwrap_or_default())
        };
        let level = |v: Option<&crate::types::WatchValue>| {
            v.map(|v| v.as_text().map(normalize_level).unwrap_or_default())
        };

        let status_watch = watchers.get(STATUS_WATCH);
        let level_watch = watchers.get(LEVEL_WATCH);

        Self {
            previous_status: status(status_watch.and_then(|w| w.previous())),
            status: status(status_watch.and_then(|w| w.current())).unwrap_or_default(),
            previous_level: level(level_watch.and_then(|w| w.previous())),
            level: level(level_watch.and_then(|w| w.current())).unwrap_or_default(),
        }
    }

    pub fn status_changed(&self) -> bool {
        self.previous_status != Some(self.status)
    }

    pub fn level_changed(&self) -> bool {
        self.previous_level.as_deref() != Some(self.level.as_str())
    }
}

/// Shared state machine parameterized by profile data
#[derive(Clone, Debug)]
pub struct TransitionEngine {
    reset_level: Option<String>,
    start_level: Option<String>,
    options: RunOptions,
    whitelist: LevelWhitelist,
    /// Last level observed outside of a save
    settled_level: Option<String>,
    run_active: bool,
    paused: bool,
}

impl TransitionEngine {
    pub fn new(profile: &GameProfile, options: RunOptions, whitelist: LevelWhitelist) -> Self {
        Self {
            reset_level: profile.reset_level.map(normalize_level),
            start_level: profile.start_level.map(normalize_level),
            options,
            whitelist,
            settled_level: None,
            run_active: false,
            paused: false,
        }
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn whitelist(&self) -> &LevelWhitelist {
        &self.whitelist
    }

    pub fn run_active(&self) -> bool {
        self.run_active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Overrides the tracked run state, e.g. when the user starts or resets the timer by hand
    pub fn sync_run_state(&mut self, active: bool) {
        self.run_active = active;
        if !active {
            self.paused = false;
        }
    }

    /// Commands for one tick, in the order they must be applied
    pub fn evaluate(&mut self, snapshot: &Snapshot) -> Vec<TimingCommand> {
        let status_changed = snapshot.status_changed();
        let level_changed = snapshot.level_changed();

        // The level field is not trusted while saving
        let left_level = if snapshot.status == Status::Saving {
            None
        } else {
            self.settled_level.replace(snapshot.level.clone())
        };

        if snapshot.status == Status::Loading && (status_changed || level_changed) {
            let level = Some(snapshot.level.as_str());
            if self.options.auto_reset && self.reset_level.as_deref() == level {
                self.run_active = false;
                self.paused = false;
                return vec![TimingCommand::Reset];
            }
            if self.options.auto_start && self.start_level.as_deref() == level {
                self.run_active = true;
                self.paused = false;
                return vec![TimingCommand::Start];
            }
        }

        let mut commands = Vec::new();

        let entered_new_level = left_level
            .as_deref()
            .is_some_and(|l| !l.is_empty() && l != snapshot.level);
        if entered_new_level
            && self.run_active
            && self.options.split_on_level_change
            && self.whitelist.is_enabled(&snapshot.level)
        {
            commands.push(TimingCommand::Split);
        }

        if status_changed && self.run_active {
            if snapshot.status.is_busy() && !self.paused {
                self.paused = true;
                commands.push(TimingCommand::Pause);
            } else if snapshot.status == Status::None && self.paused {
                self.paused = false;
                commands.push(TimingCommand::Resume);
            }
        }

        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::titles::DEUS_EX;
    use crate::memory::sim::SimulatedProcess;
    use crate::memory::MemoryWatcher;
    use crate::types::{TextEncoding, ValueType};
    use TimingCommand::*;

    /// Feeds successive (status, level) samples the way the watchers would report them
    struct Feed {
        engine: TransitionEngine,
        last: Option<(Status, String)>,
    }

    impl Feed {
        fn new(options: RunOptions) -> Self {
            let engine = TransitionEngine::new(&DEUS_EX, options, LevelWhitelist::for_profile(&DEUS_EX));
            Self { engine, last: None }
        }

        fn tick(&mut self, status: Status, level: &str) -> Vec<TimingCommand> {
            let snapshot = Snapshot {
                previous_status: self.last.as_ref().map(|(s, _)| *s),
                status,
                previous_level: self.last.as_ref().map(|(_, l)| l.clone()),
                level: normalize_level(level),
            };
            self.last = Some((status, snapshot.level.clone()));
            self.engine.evaluate(&snapshot)
        }
    }

    fn splitting() -> RunOptions {
        RunOptions {
            split_on_level_change: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_reset_start_split_scenario() {
        let mut feed = Feed::new(splitting());

        assert_eq!(feed.tick(Status::Loading, "00_intro"), vec![Reset]);
        assert_eq!(feed.tick(Status::Loading, "01_nyc_unatcoisland"), vec![Start]);
        assert_eq!(feed.tick(Status::Loading, "02_nyc_street"), vec![Split]);
        assert_eq!(feed.tick(Status::Loading, "02_nyc_street"), vec![]);
    }

    #[test]
    fn test_steady_state_is_silent() {
        let mut feed = Feed::new(splitting());
        feed.tick(Status::Loading, "01_nyc_unatcoisland");
        feed.tick(Status::None, "01_nyc_unatcoisland");

        for _ in 0..10 {
            assert!(feed.tick(Status::None, "01_nyc_unatcoisland").is_empty());
        }
    }

    #[test]
    fn test_reset_regardless_of_prior_state() {
        let mut feed = Feed::new(splitting());
        feed.tick(Status::Loading, "01_nyc_unatcoisland");
        feed.tick(Status::None, "02_nyc_street");
        feed.tick(Status::Saving, "02_nyc_street");

        assert_eq!(feed.tick(Status::Loading, "00_intro"), vec![Reset]);
        assert!(!feed.engine.run_active());
        assert!(!feed.engine.is_paused());
    }

    #[test]
    fn test_level_comparison_ignores_case() {
        let mut feed = Feed::new(RunOptions::default());
        assert_eq!(feed.tick(Status::Loading, "00_Intro"), vec![Reset]);
        assert_eq!(feed.tick(Status::Loading, "01_NYC_UNATCOIsland"), vec![Start]);
    }

    #[test]
    fn test_toggles_disable_start_and_reset() {
        let mut feed = Feed::new(RunOptions {
            auto_start: false,
            auto_reset: false,
            split_on_level_change: false,
        });
        assert!(feed.tick(Status::Loading, "00_intro").is_empty());
        assert!(feed.tick(Status::Loading, "01_nyc_unatcoisland").is_empty());
        assert!(!feed.engine.run_active());
    }

    #[test]
    fn test_saving_never_splits() {
        let mut feed = Feed::new(splitting());
        feed.tick(Status::Loading, "01_nyc_unatcoisland");
        feed.tick(Status::None, "01_nyc_unatcoisland");

        let commands = feed.tick(Status::Saving, "02_nyc_street");
        assert!(!commands.contains(&Split));
        assert_eq!(commands, vec![Pause]);
    }

    #[test]
    fn test_level_seen_while_saving_is_ignored() {
        let mut feed = Feed::new(splitting());
        assert_eq!(feed.tick(Status::Loading, "01_nyc_unatcoisland"), vec![Start]);
        assert!(feed.tick(Status::None, "01_nyc_unatcoisland").is_empty());

        assert_eq!(feed.tick(Status::Saving, "02_nyc_street"), vec![Pause]);
        assert_eq!(feed.tick(Status::None, "01_nyc_unatcoisland"), vec![Resume]);

        assert_eq!(feed.tick(Status::Loading, "02_nyc_street"), vec![Split, Pause]);
    }

    #[test]
    fn test_split_requires_whitelisted_enabled_level() {
        let mut feed = Feed::new(splitting());
        feed.engine.whitelist.set("02_nyc_street", false);
        feed.tick(Status::Loading, "01_nyc_unatcoisland");

        assert!(feed.tick(Status::Loading, "02_nyc_street").is_empty());
        assert!(feed.tick(Status::Loading, "dx_custom_map").is_empty());
        assert_eq!(feed.tick(Status::Loading, "02_nyc_bar"), vec![Split]);
    }

    #[test]
    fn test_split_requires_active_run() {
        let mut feed = Feed::new(splitting());
        feed.tick(Status::None, "01_nyc_unatcohq");
        assert!(feed.tick(Status::Loading, "02_nyc_street").is_empty());

        feed.engine.sync_run_state(true);
        assert_eq!(feed.tick(Status::Loading, "02_nyc_bar"), vec![Split]);
    }

    #[test]
    fn test_first_level_after_attach_does_not_split() {
        let mut feed = Feed::new(splitting());
        feed.engine.sync_run_state(true);
        feed.tick(Status::None, "");
        assert_eq!(feed.tick(Status::Loading, "02_nyc_street"), vec![Pause]);
    }

    #[test]
    fn test_pause_and_resume_around_loads() {
        let mut feed = Feed::new(splitting());
        assert_eq!(feed.tick(Status::Loading, "01_nyc_unatcoisland"), vec![Start]);
        assert!(feed.tick(Status::None, "01_nyc_unatcoisland").is_empty());

        assert_eq!(feed.tick(Status::Loading, "01_nyc_unatcohq"), vec![Split, Pause]);
        assert!(feed.engine.is_paused());
        assert_eq!(feed.tick(Status::None, "01_nyc_unatcohq"), vec![Resume]);

        assert_eq!(feed.tick(Status::Saving, "01_nyc_unatcohq"), vec![Pause]);
        assert!(feed.tick(Status::Loading, "01_nyc_unatcohq").is_empty());
        assert_eq!(feed.tick(Status::None, "01_nyc_unatcohq"), vec![Resume]);
    }

    #[test]
    fn test_no_pause_without_run() {
        let mut feed = Feed::new(splitting());
        feed.tick(Status::None, "01_nyc_unatcohq");
        assert!(feed.tick(Status::Saving, "01_nyc_unatcohq").is_empty());
        assert!(feed.tick(Status::None, "01_nyc_unatcohq").is_empty());
    }

    #[test]
    fn test_snapshot_from_watchers() {
        let process = SimulatedProcess::new();
        process.map(0x1000, 0x100);
        process.poke_u32(0x1000, 1);
        process.poke_utf16(0x1010, "00_Intro");

        let mut watchers = WatcherList::new();
        watchers.push(MemoryWatcher::new(STATUS_WATCH, 0x1000, ValueType::I32));
        watchers.push(MemoryWatcher::new(
            LEVEL_WATCH,
            0x1010,
            ValueType::Text { capacity: 32, encoding: TextEncoding::Utf16 },
        ));

        watchers.poll_all(&process).unwrap();
        let first = Snapshot::from_watchers(&watchers);
        assert_eq!(first.previous_status, None);
        assert_eq!(first.status, Status::Loading);
        assert_eq!(first.previous_level, None);
        assert_eq!(first.level, "00_intro");
        assert!(first.status_changed() && first.level_changed());

        process.poke_u32(0x1000, 99);
        watchers.poll_all(&process).unwrap();
        let second = Snapshot::from_watchers(&watchers);
        assert_eq!(second.previous_status, Some(Status::Loading));
        assert_eq!(second.status, Status::None);
        assert!(!second.level_changed());
    }

    #[test]
    fn test_whitelist_normalizes_keys() {
        let whitelist: LevelWhitelist = [(" Vortex2 ", true), ("nyleve", false)].into_iter().collect();
        assert!(whitelist.is_enabled("VORTEX2"));
        assert!(!whitelist.is_enabled("nyleve"));
        assert!(!whitelist.is_enabled("dig"));
        assert_eq!(whitelist.len(), 2);
    }
}

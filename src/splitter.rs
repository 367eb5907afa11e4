/// Host-facing driver
///
/// Owns the profile registry and the settings, and for the attached process the
/// injector, the watchers and the transition engine. The host calls
/// `on_process_attached` once per process instance, `on_tick` at its polling
/// cadence and `on_process_detached` when it lets go of the process.

use crate::detour::{Cells, Injector};
use crate::error::{Error, Result};
use crate::game::{GameProfile, Registry, Snapshot, TransitionEngine};
use crate::memory::{ModuleInfo, ProcessCode, WatcherList};
use crate::settings::Settings;
use crate::types::TimingCommand;
use tracing::{debug, info, warn};

/// Outcome of one tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Commands to apply in order, possibly none
    Commands(Vec<TimingCommand>),
    /// The process could not be read and the session was torn down
    Detached,
}

struct Session {
    process_name: String,
    profile: &'static GameProfile,
    injector: Injector,
    watchers: WatcherList,
    engine: TransitionEngine,
}

pub struct Splitter {
    registry: Registry,
    settings: Settings,
    session: Option<Session>,
}

impl Splitter {
    pub fn new(registry: Registry, settings: Settings) -> Self {
        Self {
            registry,
            settings,
            session: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Profile of the attached process
    pub fn profile(&self) -> Option<&'static GameProfile> {
        self.session.as_ref().map(|s| s.profile)
    }

    pub fn cells(&self) -> Option<Cells> {
        self.session.as_ref().and_then(|s| s.injector.cells())
    }

    /// Names of the detours active in the attached process
    pub fn installed_detours(&self) -> Vec<&'static str> {
        self.session
            .as_ref()
            .map(|s| s.injector.patches().iter().map(|p| p.name).collect())
            .unwrap_or_default()
    }

    /// Profile for `process_name`, honoring the `game` override
    pub fn select_profile(&self, process_name: &str) -> Option<&'static GameProfile> {
        match &self.settings.game {
            Some(game) => self.registry.find_by_name(game),
            None => self.registry.find_by_process(process_name),
        }
    }

    /// Whether `process_name` is a candidate to attach to
    ///
    /// With a `game` override only that profile's executables qualify.
    pub fn is_game_process(&self, process_name: &str) -> bool {
        match &self.settings.game {
            Some(game) => self
                .registry
                .find_by_name(game)
                .is_some_and(|p| p.matches_process(process_name)),
            None => self.registry.find_by_process(process_name).is_some(),
        }
    }

    /// Tells the engine that the timer was started or reset outside of this splitter
    pub fn sync_run_state(&mut self, active: bool) {
        if let Some(session) = &mut self.session {
            session.engine.sync_run_state(active);
        }
    }

    /// Selects a profile, installs its detours and resolves its watchers
    ///
    /// A detour the running build does not support is skipped with a warning; the
    /// session then only sees what the remaining watchers expose.
    pub fn on_process_attached(
        &mut self,
        process: &dyn ProcessCode,
        process_name: &str,
        modules: &[ModuleInfo],
    ) -> Result<&'static GameProfile> {
        if self.session.is_some() {
            self.on_process_detached(process);
        }

        let profile = self
            .select_profile(process_name)
            .ok_or_else(|| Error::UnknownGame(process_name.to_string()))?;
        info!("Attaching to {} as {}", process_name, profile.title);

        let mut injector = Injector::new();
        match attach(profile, &mut injector, process, process_name, modules) {
            Ok(watchers) => {
                let engine = TransitionEngine::new(
                    profile,
                    self.settings.run_options(),
                    self.settings.whitelist_for(profile),
                );
                self.session = Some(Session {
                    process_name: process_name.to_string(),
                    profile,
                    injector,
                    watchers,
                    engine,
                });
                Ok(profile)
            }
            Err(e) => {
                if let Err(restore) = injector.restore_all(process) {
                    warn!("Failed to restore {} after attach failure: {}", process_name, restore);
                }
                Err(e)
            }
        }
    }

    /// Polls every watcher and evaluates the transition engine once
    pub fn on_tick(&mut self, process: &dyn ProcessCode) -> Tick {
        let Some(session) = &mut self.session else {
            return Tick::Commands(Vec::new());
        };

        if let Err(e) = session.watchers.poll_all(process) {
            if e.is_process_lost() {
                info!("{} exited", session.process_name);
            } else {
                warn!("Lost {}: {}", session.process_name, e);
            }
            self.on_process_detached(process);
            return Tick::Detached;
        }

        let snapshot = Snapshot::from_watchers(&session.watchers);
        let commands = session.engine.evaluate(&snapshot);
        for command in &commands {
            debug!("{} (status={}, level={:?})", command, snapshot.status, snapshot.level);
        }
        Tick::Commands(commands)
    }

    /// Restores patched code if the process is still running and drops the session
    pub fn on_process_detached(&mut self, process: &dyn ProcessCode) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        if let Err(e) = session.injector.restore_all(process) {
            warn!("Failed to restore detours in {}: {}", session.process_name, e);
            session.injector.discard();
        }
        info!("Detached from {}", session.process_name);
    }
}

fn attach(
    profile: &'static GameProfile,
    injector: &mut Injector,
    process: &dyn ProcessCode,
    process_name: &str,
    modules: &[ModuleInfo],
) -> Result<WatcherList> {
    let attach_failure = |reason: String| Error::AttachFailure {
        process: process_name.to_string(),
        reason,
    };

    let cells = if profile.needs_cells() {
        let cells = injector
            .allocate_cells(process, profile.level_capacity)
            .map_err(|e| attach_failure(e.to_string()))?;
        Some(cells)
    } else {
        None
    };

    for detour in profile.detours() {
        match injector.install(process, modules, detour) {
            Ok(_) => {}
            Err(e) if e.is_unsupported_build() => {
                warn!("Unsupported build of {}, continuing without {}: {}", profile.title, detour.name, e);
            }
            Err(e) if e.is_definition_error() => return Err(e.into()),
            Err(e) => return Err(attach_failure(e.to_string())),
        }
    }

    Ok(profile.resolve_watchers(process, modules, cells)?)
}

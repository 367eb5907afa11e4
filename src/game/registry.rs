/// Known titles and profile selection

use super::error::{ProfileError, Result};
use super::profile::GameProfile;
use super::titles;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct Registry {
    profiles: Vec<&'static GameProfile>,
}

impl Registry {
    /// Registry of every built-in title
    pub fn builtin() -> Result<Self> {
        Self::with_profiles(titles::ALL.to_vec())
    }

    /// Validates every profile up front so a broken definition never becomes active
    pub fn with_profiles(profiles: Vec<&'static GameProfile>) -> Result<Self> {
        for (i, profile) in profiles.iter().enumerate() {
            if profiles[..i].iter().any(|p| p.title.eq_ignore_ascii_case(profile.title)) {
                return Err(ProfileError::DuplicateProfile(profile.title.to_string()));
            }
            profile.validate()?;
            debug!("Registered profile {}", profile.title);
        }
        Ok(Self { profiles })
    }

    pub fn profiles(&self) -> &[&'static GameProfile] {
        &self.profiles
    }

    /// Profile owning the executable `process_name`
    pub fn find_by_process(&self, process_name: &str) -> Option<&'static GameProfile> {
        self.profiles
            .iter()
            .copied()
            .find(|p| p.matches_process(process_name))
    }

    /// Profile whose title or a display name equals `name`, ignoring case
    pub fn find_exact_name(&self, name: &str) -> Option<&'static GameProfile> {
        let name = name.trim();
        self.profiles.iter().copied().find(|p| p.is_named(name))
    }

    /// Profile named `name`
    ///
    /// An exact title or display name wins. Otherwise the profile with the longest
    /// display name contained in `name` is picked, the earliest on ties.
    pub fn find_by_name(&self, name: &str) -> Option<&'static GameProfile> {
        if let Some(profile) = self.find_exact_name(name) {
            return Some(profile);
        }
        let mut best: Option<(usize, &'static GameProfile)> = None;
        for profile in self.profiles.iter().copied() {
            if let Some(len) = profile.display_name_match(name) {
                if best.map_or(true, |(best_len, _)| len > best_len) {
                    best = Some((len, profile));
                }
            }
        }
        best.map(|(_, profile)| profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detour::templates::LOAD_MAP;
    use crate::detour::DetourSpec;
    use crate::game::titles::{DEUS_EX, UNREAL};

    #[test]
    fn test_builtin_profiles_are_valid() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.profiles().len(), 2);
    }

    #[test]
    fn test_find_by_process() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.find_by_process("DeusEx.exe").unwrap().title, DEUS_EX.title);
        assert_eq!(registry.find_by_process("unreal").unwrap().title, UNREAL.title);
        assert!(registry.find_by_process("notepad.exe").is_none());
    }

    #[test]
    fn test_find_by_name() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.find_by_name("DeusEx").unwrap().title, "DeusEx");
        assert_eq!(registry.find_by_name("Deus Ex: GOTY Edition").unwrap().title, "DeusEx");
        assert_eq!(registry.find_by_name("unreal gold").unwrap().title, "Unreal");
        assert!(registry.find_by_name("Half-Life").is_none());
        assert_eq!(registry.find_exact_name(" deusex ").unwrap().title, "DeusEx");
    }

    #[test]
    fn test_find_by_name_prefers_exact_match() {
        let tournament: &'static GameProfile = Box::leak(Box::new(GameProfile {
            title: "UnrealTournament",
            display_names: &["Unreal Tournament"],
            process_names: &["unrealtournament"],
            ..UNREAL
        }));
        let registry = Registry::with_profiles(vec![&UNREAL, tournament]).unwrap();

        assert_eq!(registry.find_by_name("unreal tournament").unwrap().title, "UnrealTournament");
        assert_eq!(
            registry.find_by_name("Unreal Tournament GOTY").unwrap().title,
            "UnrealTournament"
        );
        assert_eq!(registry.find_by_name("Unreal Gold").unwrap().title, "Unreal");
        assert_eq!(registry.find_by_name("UNREAL").unwrap().title, "Unreal");
        assert!(registry.find_exact_name("Unreal Tournament GOTY").is_none());
    }

    #[test]
    fn test_duplicate_title_rejected() {
        let err = Registry::with_profiles(vec![&DEUS_EX, &DEUS_EX]).unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateProfile(_)));
    }

    #[test]
    fn test_broken_profile_fails_registration() {
        let broken: &'static GameProfile = Box::leak(Box::new(GameProfile {
            title: "Broken",
            load_detour: Some(DetourSpec {
                template: "E8 #4\nmov eax,1",
                ..LOAD_MAP
            }),
            ..UNREAL
        }));

        let err = Registry::with_profiles(vec![&UNREAL, broken]).unwrap_err();
        match err {
            ProfileError::InvalidDetour { title, source } => {
                assert_eq!(title, "Broken");
                assert!(source.is_definition_error());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

use crate::detour::templates::LOAD_MAP;
use crate::game::profile::{GameProfile, WatchSpec, DEFAULT_LEVEL_CAPACITY};

static WATCHES: [WatchSpec; 2] = [
    WatchSpec::status(),
    WatchSpec::level(DEFAULT_LEVEL_CAPACITY),
];

/// Unreal / Unreal Gold single-player campaign
///
/// The title screen fly-by is the `unreal` map; a new game always opens on `vortex2`.
pub static UNREAL: GameProfile = GameProfile {
    title: "Unreal",
    display_names: &["Unreal", "Unreal Gold"],
    process_names: &["unreal"],
    watches: &WATCHES,
    levels: &[
        "vortex2",
        "nyleve",
        "dig",
        "dug",
        "passage",
        "chizra",
        "ceremony",
        "dark",
        "harobed",
        "terralift",
        "terraniux",
        "noork",
        "ruins",
        "trench",
        "isvkran4",
        "isvkran32",
        "isvdeck1",
        "spirevillage",
        "thesunspire",
        "skycaves",
        "skytown",
        "skybase",
        "veloraend",
        "bluff",
        "dasapass",
        "dasacellars",
        "naliboat",
        "nalic",
        "nalilord",
        "dcrater",
        "extremebeg",
        "extremelab",
        "extremecore",
        "extremegen",
        "extremedgen",
        "extremedark",
        "extremecave",
        "extremeend",
        "queenend",
        "endgame",
    ],
    reset_level: Some("unreal"),
    start_level: Some("vortex2"),
    level_capacity: DEFAULT_LEVEL_CAPACITY,
    load_detour: Some(LOAD_MAP),
    save_detour: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_is_valid() {
        UNREAL.validate().unwrap();
        assert_eq!(UNREAL.detours().count(), 1);
    }
}

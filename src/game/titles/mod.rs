pub mod deus_ex;
pub mod unreal;

pub use deus_ex::DEUS_EX;
pub use unreal::UNREAL;

use super::profile::GameProfile;

/// Every built-in profile, in registry order
pub static ALL: [&GameProfile; 2] = [&DEUS_EX, &UNREAL];

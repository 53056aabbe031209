//! Small bitmask flag sets.
//!
//! Used for two things in the controller:
//! - `ControlMode` flags selected by the configuration mode string.
//! - `SceneTag` flags carried in physics `user_data` so ray predicates can opt
//!   colliders out of character or camera queries.

use num_traits::{One, PrimInt};

/// Implemented by flag enums declared with [`define_bitmask_flags!`].
pub trait FlagBitmask: Sized + Copy + 'static {
    type Storage: PrimInt;

    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    fn bit_index(&self) -> u8;

    fn name(&self) -> &'static str;

    fn mask(&self) -> Self::Storage {
        // bit_index() must stay below the bit width of `Storage`.
        Self::Storage::one() << (self.bit_index() as usize)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|flag| flag.name() == name)
    }
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitmaskFlags<T: PrimInt> {
    pub bits: T,
}

impl<T: PrimInt> BitmaskFlags<T> {
    pub fn new(bits: T) -> Self {
        Self { bits }
    }

    pub fn of<U: FlagBitmask<Storage = T>>(tags: &[U]) -> Self {
        let mut flags = Self::new(T::zero());
        for &tag in tags {
            flags.add(tag);
        }
        flags
    }

    pub fn add<U: FlagBitmask<Storage = T>>(&mut self, tag: U) {
        self.bits = self.bits | tag.mask();
    }

    pub fn remove<U: FlagBitmask<Storage = T>>(&mut self, tag: U) {
        self.bits = self.bits & !tag.mask();
    }

    #[inline]
    pub fn has<U: FlagBitmask<Storage = T>>(&self, tag: U) -> bool {
        (self.bits & tag.mask()) != T::zero()
    }

    pub fn has_any<U: FlagBitmask<Storage = T>>(&self, tags: &[U]) -> bool {
        let combined = tags.iter().fold(T::zero(), |acc, t| acc | t.mask());
        (self.bits & combined) != T::zero()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == T::zero()
    }

    /// Parse a whitespace separated list of flag names.
    ///
    /// Returns the first unknown token on failure. An empty string yields an
    /// empty set.
    pub fn parse_names<U: FlagBitmask<Storage = T>>(text: &str) -> Result<Self, String> {
        let mut flags = Self::new(T::zero());
        for token in text.split_whitespace() {
            match U::from_name(token) {
                Some(flag) => flags.add(flag),
                None => return Err(token.to_string()),
            }
        }
        Ok(flags)
    }

    /// Inverse of [`BitmaskFlags::parse_names`], in declaration order.
    pub fn names<U: FlagBitmask<Storage = T>>(&self) -> Vec<&'static str> {
        U::ALL
            .iter()
            .filter(|flag| self.has(**flag))
            .map(|flag| flag.name())
            .collect()
    }
}

/// Declare a bitmask-backed enum and implement `FlagBitmask` for it.
///
/// ```rust
/// garden_shared::define_bitmask_flags!(Surface, u8, {
///     Slippery,
///     Sticky,
/// });
/// ```
#[macro_export]
macro_rules! define_bitmask_flags {
    ($name:ident, $storage:ty, { $($variant:ident),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant),*
        }

        impl $crate::bitmask_flags::FlagBitmask for $name {
            type Storage = $storage;

            const ALL: &'static [Self] = &[$($name::$variant),*];

            fn bit_index(&self) -> u8 {
                *self as u8
            }

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),*
                }
            }
        }
    };
}

define_bitmask_flags!(ControlMode, u8, {
    PointToMove,
    FixedCamera,
    CameraBasedMovement,
});

define_bitmask_flags!(SceneTag, u32, {
    ExcludeCharacterRay,
    ExcludeCameraCollision,
});

pub type ControlModes = BitmaskFlags<u8>;
pub type SceneTags = BitmaskFlags<u32>;

impl SceneTags {
    /// Tags are stored in the low 32 bits of a physics `user_data` word.
    #[inline]
    pub fn from_user_data(user_data: u128) -> Self {
        Self::new((user_data & u32::MAX as u128) as u32)
    }

    #[inline]
    pub fn to_user_data(self) -> u128 {
        self.bits as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_string_combines_flags() {
        let modes = ControlModes::parse_names::<ControlMode>("FixedCamera  PointToMove").unwrap();
        assert!(modes.has(ControlMode::PointToMove));
        assert!(modes.has(ControlMode::FixedCamera));
        assert!(!modes.has(ControlMode::CameraBasedMovement));
        assert_eq!(
            modes.names::<ControlMode>(),
            vec!["PointToMove", "FixedCamera"]
        );
    }

    #[test]
    fn empty_mode_string_is_empty_set() {
        let modes = ControlModes::parse_names::<ControlMode>("   ").unwrap();
        assert!(modes.is_empty());
    }

    #[test]
    fn unknown_mode_token_is_reported() {
        let err = ControlModes::parse_names::<ControlMode>("PointToMove Hover").unwrap_err();
        assert_eq!(err, "Hover");
    }

    #[test]
    fn scene_tags_survive_user_data() {
        let tags = SceneTags::of(&[SceneTag::ExcludeCameraCollision]);
        // Upper bits belong to whoever else uses user_data.
        let word = tags.to_user_data() | (7u128 << 64);
        let back = SceneTags::from_user_data(word);
        assert!(back.has(SceneTag::ExcludeCameraCollision));
        assert!(!back.has(SceneTag::ExcludeCharacterRay));
    }

    #[test]
    fn remove_clears_only_that_bit() {
        let mut tags = SceneTags::of(&[SceneTag::ExcludeCharacterRay, SceneTag::ExcludeCameraCollision]);
        tags.remove(SceneTag::ExcludeCharacterRay);
        assert!(!tags.has(SceneTag::ExcludeCharacterRay));
        assert!(tags.has_any(&[SceneTag::ExcludeCameraCollision]));
    }
}

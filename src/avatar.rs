//! Per-room avatar pools
//!
//! Every joining player gets an emoji avatar from a fixed set of sixteen.
//! Within a room each avatar is handed out at most once while any remain
//! free; once the set is exhausted the pool falls back to random repeats
//! rather than refusing the join. Pools are process-local and rebuilt as
//! events come in; they are not authoritative state.

use dashmap::DashMap;

use crate::{code::RoomCode, constants::AVATARS};

/// Tracks which avatars are in use in each room
#[derive(Debug, Default)]
pub struct AvatarPools {
    in_use: DashMap<String, Vec<String>>,
}

impl AvatarPools {
    /// Creates an empty pool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out an unused avatar for the room, chosen pseudorandomly
    ///
    /// When every avatar is taken the pool returns a random member of the
    /// set anyway, so a full room never blocks on avatars.
    pub fn acquire(&self, code: &RoomCode) -> String {
        let mut used = self.in_use.entry(code.to_string()).or_default();
        let free: Vec<&str> = AVATARS
            .iter()
            .copied()
            .filter(|a| !used.iter().any(|u| u == a))
            .collect();
        let picked = if free.is_empty() {
            AVATARS[fastrand::usize(..AVATARS.len())]
        } else {
            free[fastrand::usize(..free.len())]
        };
        used.push(picked.to_owned());
        picked.to_owned()
    }

    /// Grants the requested avatar if it is free, otherwise falls back to
    /// [`AvatarPools::acquire`]
    pub fn acquire_preferred(&self, code: &RoomCode, wanted: &str) -> String {
        {
            let mut used = self.in_use.entry(code.to_string()).or_default();
            if AVATARS.contains(&wanted) && !used.iter().any(|u| u == wanted) {
                used.push(wanted.to_owned());
                return wanted.to_owned();
            }
        }
        self.acquire(code)
    }

    /// Returns an avatar to the room's pool
    pub fn release(&self, code: &RoomCode, avatar: &str) {
        if let Some(mut used) = self.in_use.get_mut(code.as_str()) {
            if let Some(pos) = used.iter().position(|u| u == avatar) {
                used.swap_remove(pos);
            }
        }
    }

    /// Clears the room's in-use set
    pub fn reset(&self, code: &RoomCode) {
        if let Some(mut used) = self.in_use.get_mut(code.as_str()) {
            used.clear();
        }
    }

    /// Forgets the room entirely
    pub fn drop_room(&self, code: &RoomCode) {
        self.in_use.remove(code.as_str());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn code() -> RoomCode {
        "AB2C3D".parse().unwrap()
    }

    #[test]
    fn acquired_avatars_are_unique_until_exhausted() {
        let pools = AvatarPools::new();
        let code = code();

        let handed: HashSet<String> = (0..AVATARS.len()).map(|_| pools.acquire(&code)).collect();
        assert_eq!(handed.len(), AVATARS.len());

        // Seventeenth player still gets something from the set.
        let fallback = pools.acquire(&code);
        assert!(AVATARS.contains(&fallback.as_str()));
    }

    #[test]
    fn preferred_avatar_is_granted_when_free() {
        let pools = AvatarPools::new();
        let code = code();
        assert_eq!(pools.acquire_preferred(&code, "🐼"), "🐼");
        // Second request for the same avatar gets a different one.
        assert_ne!(pools.acquire_preferred(&code, "🐼"), "🐼");
    }

    #[test]
    fn released_avatars_become_available_again() {
        let pools = AvatarPools::new();
        let code = code();
        for _ in 0..AVATARS.len() {
            pools.acquire(&code);
        }
        pools.release(&code, "🦊");
        assert_eq!(pools.acquire_preferred(&code, "🦊"), "🦊");
    }

    #[test]
    fn pools_are_independent_per_room() {
        let pools = AvatarPools::new();
        let a: RoomCode = "AAAAAA".parse().unwrap();
        let b: RoomCode = "BBBBBB".parse().unwrap();
        assert_eq!(pools.acquire_preferred(&a, "🐸"), "🐸");
        assert_eq!(pools.acquire_preferred(&b, "🐸"), "🐸");
    }

    #[test]
    fn reset_clears_the_room() {
        let pools = AvatarPools::new();
        let code = code();
        pools.acquire_preferred(&code, "🦁");
        pools.reset(&code);
        assert_eq!(pools.acquire_preferred(&code, "🦁"), "🦁");
    }
}

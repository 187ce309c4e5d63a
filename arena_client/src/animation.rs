//! Character presentation.
//!
//! Rendering is external; a view only has to play named clips and mirror
//! itself. Profiles map movement states to clips and can be loaded from JSON.
//! The driver forwards changes on edges only, so a clip is never restarted
//! while its state holds.

use std::sync::Arc;

use anyhow::Context;
use arena_shared::movement::MovementState;
use serde::{Deserialize, Serialize};

/// A renderable character (sprite, mesh, log line...).
pub trait CharacterView {
    fn play(&mut self, clip: &ClipSpec);
    fn set_facing(&mut self, left: bool);
}

/// One animation clip of a sprite sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    pub state: MovementState,
    pub key: String,
    pub first_frame: u32,
    pub last_frame: u32,
    pub frame_rate: u32,
    #[serde(default = "default_looping")]
    pub looping: bool,
}

fn default_looping() -> bool {
    true
}

impl ClipSpec {
    pub fn frame_count(&self) -> u32 {
        self.last_frame.saturating_sub(self.first_frame) + 1
    }
}

/// Sprite sheet and clip table for a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub sprite_id: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub clips: Vec<ClipSpec>,
}

impl CharacterProfile {
    /// The default fighter.
    pub fn jin() -> Self {
        Self {
            sprite_id: "jin-def".into(),
            frame_width: 159,
            frame_height: 115,
            clips: vec![ClipSpec {
                state: MovementState::Idle,
                key: "jin-idle".into(),
                first_frame: 0,
                last_frame: 3,
                frame_rate: 6,
                looping: true,
            }],
        }
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let profile: Self = serde_json::from_str(s).context("parse character profile")?;
        anyhow::ensure!(
            profile.clip_for(MovementState::Idle).is_some(),
            "profile {} has no clip",
            profile.sprite_id
        );
        Ok(profile)
    }

    /// Clip for `state`, falling back to the idle clip.
    pub fn clip_for(&self, state: MovementState) -> Option<&ClipSpec> {
        self.clips
            .iter()
            .find(|c| c.state == state)
            .or_else(|| self.clips.iter().find(|c| c.state == MovementState::Idle))
            .or_else(|| self.clips.first())
    }
}

/// Keeps one view in step with an entity's state and facing.
pub struct AnimationDriver<V> {
    profile: Arc<CharacterProfile>,
    view: V,
    state: Option<MovementState>,
    facing_left: Option<bool>,
}

impl<V: CharacterView> AnimationDriver<V> {
    pub fn new(profile: Arc<CharacterProfile>, view: V) -> Self {
        Self {
            profile,
            view,
            state: None,
            facing_left: None,
        }
    }

    /// Pushes changes since the last sync to the view.
    pub fn sync(&mut self, state: MovementState, facing_left: bool) {
        if self.facing_left != Some(facing_left) {
            self.facing_left = Some(facing_left);
            self.view.set_facing(facing_left);
        }
        if self.state != Some(state) {
            self.state = Some(state);
            if let Some(clip) = self.profile.clip_for(state) {
                self.view.play(clip);
            }
        }
    }

    pub fn into_view(self) -> V {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        played: Vec<String>,
        facings: Vec<bool>,
    }

    impl CharacterView for Recorder {
        fn play(&mut self, clip: &ClipSpec) {
            self.played.push(clip.key.clone());
        }

        fn set_facing(&mut self, left: bool) {
            self.facings.push(left);
        }
    }

    #[test]
    fn jin_idles_on_four_frames() {
        let jin = CharacterProfile::jin();
        let idle = jin.clip_for(MovementState::Idle).unwrap();
        assert_eq!(idle.frame_count(), 4);
        assert_eq!(idle.frame_rate, 6);
        assert!(idle.looping);
        // No walk clip; falls back to idle.
        assert_eq!(jin.clip_for(MovementState::Walking).unwrap().key, "jin-idle");
    }

    #[test]
    fn driver_only_forwards_edges() {
        let mut d = AnimationDriver::new(Arc::new(CharacterProfile::jin()), Recorder::default());
        d.sync(MovementState::Idle, false);
        d.sync(MovementState::Idle, false);
        d.sync(MovementState::Idle, true);
        d.sync(MovementState::Walking, true);

        let r = d.into_view();
        assert_eq!(r.played, vec!["jin-idle", "jin-idle"]);
        assert_eq!(r.facings, vec![false, true]);
    }

    #[test]
    fn profile_from_json() -> anyhow::Result<()> {
        let p = CharacterProfile::from_json_str(
            r#"{
                "sprite_id": "ken",
                "frame_width": 64,
                "frame_height": 64,
                "clips": [
                    {"state": "Idle", "key": "ken-idle", "first_frame": 0, "last_frame": 5, "frame_rate": 8},
                    {"state": "Walking", "key": "ken-walk", "first_frame": 6, "last_frame": 11, "frame_rate": 12}
                ]
            }"#,
        )?;
        assert_eq!(p.clip_for(MovementState::Walking).unwrap().key, "ken-walk");
        assert!(p.clips[0].looping);
        assert!(CharacterProfile::from_json_str(
            r#"{"sprite_id":"x","frame_width":1,"frame_height":1,"clips":[]}"#
        )
        .is_err());
        Ok(())
    }
}

//! Semantic animation cursor and the clip driver that follows it.
//!
//! [`AnimationStateMachine`] is the one writer of "which semantic animation is current".
//! Guards live in the trigger functions, and a trigger whose guard fails is a no-op.
//! Readers subscribe to cursor changes through its [`Hub`].
//!
//! [`AnimationDriver`] turns cursor changes into clip playback on a [`ClipPlayer`] and reports
//! one-shot completion back to the machine, at most once per playback.
//!
//! Notes
//! - Play-once states: jump, jumpLand, action1..4. Everything else loops.
//! - Locomotion triggers (idle/walk/run) never cut a play-once state short. An idle request
//!   made during one is remembered and honoured when the jump arc lands.
//! - Completion is keyed by a [`PlaybackToken`]; a token from an earlier playback is stale.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::{
    constants::ANIMATION_BLEND_SECS,
    hub::{Hub, SubscriptionId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationState {
    Idle,
    Walk,
    Run,
    Jump,
    JumpIdle,
    JumpLand,
    Fall,
    Action1,
    Action2,
    Action3,
    Action4,
}

impl AnimationState {
    pub const ALL: [AnimationState; 11] = [
        AnimationState::Idle,
        AnimationState::Walk,
        AnimationState::Run,
        AnimationState::Jump,
        AnimationState::JumpIdle,
        AnimationState::JumpLand,
        AnimationState::Fall,
        AnimationState::Action1,
        AnimationState::Action2,
        AnimationState::Action3,
        AnimationState::Action4,
    ];

    #[inline]
    pub fn is_action(self) -> bool {
        matches!(
            self,
            AnimationState::Action1
                | AnimationState::Action2
                | AnimationState::Action3
                | AnimationState::Action4
        )
    }

    #[inline]
    pub fn is_one_shot(self) -> bool {
        self.is_action() || matches!(self, AnimationState::Jump | AnimationState::JumpLand)
    }

    pub fn loop_mode(self) -> LoopMode {
        if self.is_one_shot() {
            LoopMode::Once
        } else {
            LoopMode::Repeat
        }
    }
}

/// Discrete action triggers, numbered as the input layer reports them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Action1,
    Action2,
    Action3,
    Action4,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Action1, Action::Action2, Action::Action3, Action::Action4];

    fn state(self) -> AnimationState {
        match self {
            Action::Action1 => AnimationState::Action1,
            Action::Action2 => AnimationState::Action2,
            Action::Action3 => AnimationState::Action3,
            Action::Action4 => AnimationState::Action4,
        }
    }
}

/// What the controller observed this frame, in animation terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocomotionSignal {
    Idle,
    Walk,
    Run,
    Jump,
    JumpIdle,
    Fall,
}

/// Semantic state to clip name. Fixed for the lifetime of a driver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct AnimationSet {
    clips: HashMap<AnimationState, String>,
}

impl AnimationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, state: AnimationState, clip: impl Into<String>) -> Self {
        self.clips.insert(state, clip.into());
        self
    }

    pub fn clip(&self, state: AnimationState) -> Option<&str> {
        self.clips.get(&state).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackToken {
    generation: u64,
    state: AnimationState,
}

impl PlaybackToken {
    pub fn state(&self) -> AnimationState {
        self.state
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorField {
    Current,
}

#[derive(Debug)]
pub struct AnimationStateMachine {
    current: AnimationState,
    generation: u64,
    /// Idle was requested while a play-once state was running.
    idle_requested: bool,
    changes: Hub<CursorField, AnimationState>,
}

impl Default for AnimationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationStateMachine {
    pub fn new() -> Self {
        Self {
            current: AnimationState::Idle,
            generation: 0,
            idle_requested: false,
            changes: Hub::new(),
        }
    }

    #[inline]
    pub fn current(&self) -> AnimationState {
        self.current
    }

    /// Token identifying the playback of the current state.
    pub fn token(&self) -> PlaybackToken {
        PlaybackToken {
            generation: self.generation,
            state: self.current,
        }
    }

    pub fn subscribe(&mut self) -> SubscriptionId {
        self.changes.subscribe(CursorField::Current)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.changes.unsubscribe(id)
    }

    /// Cursor values published since the last drain, oldest first.
    pub fn drain_changes(&mut self, id: SubscriptionId) -> Vec<AnimationState> {
        self.changes
            .drain(id)
            .into_iter()
            .map(|(_, state)| state)
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }

    fn enter(&mut self, next: AnimationState) -> bool {
        if next == self.current {
            return false;
        }
        debug!(from = ?self.current, to = ?next, "animation cursor");
        self.current = next;
        self.generation += 1;
        self.idle_requested = false;
        self.changes.publish(CursorField::Current, next);
        true
    }

    pub fn idle(&mut self) -> bool {
        match self.current {
            AnimationState::JumpIdle => self.enter(AnimationState::JumpLand),
            state if state.is_one_shot() => {
                self.idle_requested = true;
                false
            }
            _ => self.enter(AnimationState::Idle),
        }
    }

    /// Attacks play out under locomotion; every other state gives way.
    pub fn walk(&mut self) -> bool {
        if self.current == AnimationState::Action4 {
            return false;
        }
        self.enter(AnimationState::Walk)
    }

    pub fn run(&mut self) -> bool {
        if self.current == AnimationState::Action4 {
            return false;
        }
        self.enter(AnimationState::Run)
    }

    pub fn jump(&mut self) -> bool {
        self.enter(AnimationState::Jump)
    }

    pub fn jump_idle(&mut self) -> bool {
        if self.current != AnimationState::Jump {
            return false;
        }
        self.enter(AnimationState::JumpIdle)
    }

    pub fn jump_land(&mut self) -> bool {
        if self.current != AnimationState::JumpIdle {
            return false;
        }
        self.enter(AnimationState::JumpLand)
    }

    pub fn fall(&mut self) -> bool {
        self.enter(AnimationState::Fall)
    }

    pub fn action(&mut self, action: Action) -> bool {
        let allowed = match action {
            Action::Action4 => matches!(
                self.current,
                AnimationState::Idle | AnimationState::Walk | AnimationState::Run
            ),
            _ => self.current == AnimationState::Idle,
        };
        allowed && self.enter(action.state())
    }

    pub fn reset(&mut self) -> bool {
        self.enter(AnimationState::Idle)
    }

    pub fn apply(&mut self, signal: LocomotionSignal) -> bool {
        match signal {
            LocomotionSignal::Idle => self.idle(),
            LocomotionSignal::Walk => self.walk(),
            LocomotionSignal::Run => self.run(),
            LocomotionSignal::Jump => self.jump(),
            LocomotionSignal::JumpIdle => self.jump_idle(),
            LocomotionSignal::Fall => self.fall(),
        }
    }

    /// A clip finished playing. Stale tokens are ignored.
    pub fn complete(&mut self, token: PlaybackToken) -> bool {
        if token != self.token() {
            return false;
        }
        match token.state {
            AnimationState::Jump => {
                let landing = self.idle_requested;
                let changed = self.enter(AnimationState::JumpIdle);
                self.idle_requested = landing;
                changed
            }
            AnimationState::JumpIdle => self.idle_requested && self.enter(AnimationState::JumpLand),
            state if state.is_one_shot() => self.reset(),
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    Repeat,
}

/// Playback side of the animation asset collaborator.
pub trait ClipPlayer {
    /// Start `clip` from its first frame. Returns `false` if the clip is unknown.
    fn play(&mut self, clip: &str, fade_in: f32, mode: LoopMode) -> bool;
    fn fade_out(&mut self, clip: &str, fade_out: f32);
    /// A play-once clip reached its last frame (and is holding it), or a looping clip
    /// completed at least one pass since it was last started.
    fn is_finished(&self, clip: &str) -> bool;
}

/// Follows the cursor and plays the matching clips.
#[derive(Debug)]
pub struct AnimationDriver {
    set: AnimationSet,
    subscription: SubscriptionId,
    playing: Option<String>,
    /// Completion still owed to the machine for the current play-once clip.
    awaiting: Option<PlaybackToken>,
    started: bool,
}

impl AnimationDriver {
    pub fn attach(set: AnimationSet, machine: &mut AnimationStateMachine) -> Self {
        Self {
            set,
            subscription: machine.subscribe(),
            playing: None,
            awaiting: None,
            started: false,
        }
    }

    pub fn set(&self) -> &AnimationSet {
        &self.set
    }

    pub fn playing(&self) -> Option<&str> {
        self.playing.as_deref()
    }

    /// Apply the latest cursor value to `player`, then report a finished one-shot.
    pub fn sync(&mut self, machine: &mut AnimationStateMachine, player: &mut impl ClipPlayer) {
        let changes = machine.drain_changes(self.subscription);
        if !self.started || !changes.is_empty() {
            self.started = true;
            let state = machine.current();
            if !self.switch_to(state, machine.token(), player) && state.is_one_shot() {
                // Nothing to wait for, so the play-once state ends right away.
                machine.complete(machine.token());
            }
        }

        if let (Some(token), Some(clip)) = (self.awaiting, self.playing.as_deref()) {
            if player.is_finished(clip) {
                self.awaiting = None;
                machine.complete(token);
            }
        }
    }

    /// Returns `false` when nothing could be played for `state`.
    fn switch_to(
        &mut self,
        state: AnimationState,
        token: PlaybackToken,
        player: &mut impl ClipPlayer,
    ) -> bool {
        self.awaiting = None;
        let Some(clip) = self.set.clip(state) else {
            debug!(?state, "no clip for animation state; skipping");
            return false;
        };
        if self.playing.as_deref() == Some(clip) && !state.is_one_shot() {
            return true;
        }
        if !player.play(clip, ANIMATION_BLEND_SECS, state.loop_mode()) {
            debug!(clip, "clip missing from player; skipping");
            return false;
        }
        if let Some(previous) = self.playing.replace(clip.to_string()) {
            if previous != clip {
                player.fade_out(&previous, ANIMATION_BLEND_SECS);
            }
        }
        if state.is_one_shot() || state == AnimationState::JumpIdle {
            self.awaiting = Some(token);
        }
        true
    }

    pub fn detach(self, machine: &mut AnimationStateMachine) {
        machine.unsubscribe(self.subscription);
    }
}

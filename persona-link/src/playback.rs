//! Playback gating
//!
//! The first playback needs a user gesture so host environments with autoplay
//! restrictions allow it. Once started, every new media reference plays
//! immediately.

use crate::media::InboundMediaReference;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Playback state. `Playing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    AwaitingGesture,
    Playing,
}

/// Instruction for the presentation layer to start playing a media url
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackCue {
    Play { media_url: String },
}

impl PlaybackCue {
    fn play(media: &InboundMediaReference) -> Self {
        PlaybackCue::Play {
            media_url: media.media_url().to_string(),
        }
    }
}

#[derive(Debug)]
pub struct PlaybackController {
    state: PlaybackState,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::AwaitingGesture,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The "start" gesture. Only the first one has an effect.
    pub fn gesture(&mut self, current: Option<&InboundMediaReference>) -> Option<PlaybackCue> {
        if self.state == PlaybackState::Playing {
            debug!("Gesture ignored: already playing");
            return None;
        }
        self.state = PlaybackState::Playing;
        info!("Playback started by gesture");
        current.map(PlaybackCue::play)
    }

    /// A new media reference arrived
    pub fn media_available(&mut self, media: &InboundMediaReference) -> Option<PlaybackCue> {
        match self.state {
            PlaybackState::Playing => Some(PlaybackCue::play(media)),
            PlaybackState::AwaitingGesture => {
                debug!("Media held until gesture: {}", media.media_url());
                None
            }
        }
    }

    /// The start affordance is shown only before the gesture
    pub fn start_visible(&self) -> bool {
        self.state == PlaybackState::AwaitingGesture
    }

    /// Media surface contents, if it is visible
    pub fn visible_media<'a>(
        &self,
        media: Option<&'a InboundMediaReference>,
    ) -> Option<&'a InboundMediaReference> {
        match self.state {
            PlaybackState::Playing => media,
            PlaybackState::AwaitingGesture => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(url: &str) -> InboundMediaReference {
        InboundMediaReference::new(url).unwrap()
    }

    #[test]
    fn test_media_hidden_until_gesture() {
        let mut playback = PlaybackController::new();
        let x = media("https://cdn.example/x.mp4");

        assert_eq!(playback.media_available(&x), None);
        assert!(playback.start_visible());
        assert!(playback.visible_media(Some(&x)).is_none());

        let cue = playback.gesture(Some(&x));
        assert_eq!(
            cue,
            Some(PlaybackCue::Play {
                media_url: "https://cdn.example/x.mp4".to_string()
            })
        );
        assert!(!playback.start_visible());
        assert_eq!(playback.visible_media(Some(&x)), Some(&x));
    }

    #[test]
    fn test_gesture_before_media_then_autoplay() {
        let mut playback = PlaybackController::new();
        assert_eq!(playback.gesture(None), None);
        assert_eq!(playback.state(), PlaybackState::Playing);
        assert!(playback.visible_media(None).is_none());

        let y = media("https://cdn.example/y.mp4");
        assert!(playback.media_available(&y).is_some());
        assert_eq!(playback.visible_media(Some(&y)), Some(&y));
    }

    #[test]
    fn test_second_gesture_is_noop() {
        let mut playback = PlaybackController::new();
        let x = media("https://cdn.example/x.mp4");
        assert!(playback.gesture(Some(&x)).is_some());
        assert!(playback.gesture(Some(&x)).is_none());
        assert_eq!(playback.state(), PlaybackState::Playing);
    }
}

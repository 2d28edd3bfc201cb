//! Audio Playback Adapter
//!
//! A session has exactly one audio channel. Loading a new clip replaces the
//! previous one, which stops it; only one clip is ever playing.

use serde::{Deserialize, Serialize};

/// A playable clip, addressed by URL (usually a `data:` URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub url: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioChannel {
    clip: Option<AudioClip>,
    is_playing: bool,
}

impl AudioChannel {
    /// Replaces the current clip and starts playing the new one.
    pub fn load(&mut self, clip: AudioClip) {
        self.clip = Some(clip);
        self.is_playing = true;
    }

    fn pause(&mut self) {
        self.is_playing = false;
    }

    /// Resumes the loaded clip. Does nothing when no clip is loaded.
    fn resume(&mut self) {
        self.is_playing = self.clip.is_some();
    }

    /// Flips between playing and paused; returns the new playing state.
    pub fn toggle(&mut self) -> bool {
        if self.is_playing {
            self.pause();
        } else {
            self.resume();
        }
        self.is_playing
    }

    /// Stops playback and unloads the clip.
    pub fn stop(&mut self) {
        self.clip = None;
        self.is_playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn url(&self) -> Option<&str> {
        self.clip.as_ref().map(|clip| clip.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(url: &str) -> AudioClip {
        AudioClip {
            url: url.to_string(),
            mime_type: "audio/mpeg".to_string(),
        }
    }

    #[test]
    fn test_load_replaces_and_plays() {
        let mut channel = AudioChannel::default();
        channel.load(clip("data:first"));
        channel.pause();
        channel.load(clip("data:second"));

        assert!(channel.is_playing());
        assert_eq!(channel.url(), Some("data:second"));
    }

    #[test]
    fn test_toggle_without_clip_stays_silent() {
        let mut channel = AudioChannel::default();
        assert!(!channel.toggle());
        assert!(!channel.is_playing());
    }

    #[test]
    fn test_toggle_and_stop() {
        let mut channel = AudioChannel::default();
        channel.load(clip("data:line"));
        assert!(!channel.toggle());
        assert!(channel.toggle());

        channel.stop();
        assert!(!channel.is_playing());
        assert_eq!(channel.url(), None);
    }
}

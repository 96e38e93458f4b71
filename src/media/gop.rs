//! GOP (Group of Pictures) cache for late-joining viewers
//!
//! An HTTP-FLV viewer that connects mid-stream needs, before live tags:
//! 1. The metadata (onMetaData script tag)
//! 2. The sequence headers (AVC/HEVC decoder config, AudioSpecificConfig)
//! 3. The most recent keyframe and every tag since it
//!
//! Without these a player shows nothing until the next keyframe arrives.

use std::collections::VecDeque;

use super::flv::FlvTag;

/// Default cache limit in bytes of tag body
pub const DEFAULT_MAX_GOP_SIZE: usize = 4 * 1024 * 1024;

/// Catch-up cache fed with every tag of a stream
#[derive(Debug)]
pub struct GopCache {
    max_size: usize,
    current_size: usize,
    metadata: Option<FlvTag>,
    video_header: Option<FlvTag>,
    audio_header: Option<FlvTag>,
    /// Tags since the last keyframe, the keyframe first
    frames: VecDeque<FlvTag>,
}

impl GopCache {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_GOP_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            current_size: 0,
            metadata: None,
            video_header: None,
            audio_header: None,
            frames: VecDeque::new(),
        }
    }

    /// Feed one tag of the stream
    pub fn push(&mut self, tag: &FlvTag) {
        if tag.is_script() {
            self.metadata = Some(tag.clone());
            return;
        }
        if tag.is_video_sequence_header() {
            self.video_header = Some(tag.clone());
            return;
        }
        if tag.is_aac_sequence_header() {
            self.audio_header = Some(tag.clone());
            return;
        }

        if tag.is_keyframe() {
            self.clear_frames();
        } else if self.frames.is_empty() {
            // Nothing decodable until the first keyframe
            return;
        }

        let size = tag.size();
        if size > self.max_size {
            // A single oversized keyframe cannot be cached; wait for the next GOP
            self.clear_frames();
            return;
        }

        // Over budget: drop the whole GOP rather than cut it in the middle
        if self.current_size + size > self.max_size {
            tracing::debug!(
                cached = self.current_size,
                max = self.max_size,
                "GOP cache full, dropping cached GOP"
            );
            self.clear_frames();
            if !tag.is_keyframe() {
                return;
            }
        }

        self.current_size += size;
        self.frames.push_back(tag.clone());
    }

    /// Clear cached frames, keeping metadata and sequence headers
    pub fn clear_frames(&mut self) {
        self.frames.clear();
        self.current_size = 0;
    }

    /// Clear everything
    pub fn clear(&mut self) {
        self.clear_frames();
        self.metadata = None;
        self.video_header = None;
        self.audio_header = None;
    }

    /// Tags to send to a new viewer, in order
    pub fn get_catchup_data(&self) -> Vec<FlvTag> {
        let mut result = Vec::with_capacity(self.frames.len() + 3);

        if let Some(m) = &self.metadata {
            result.push(m.clone());
        }
        if let Some(h) = &self.video_header {
            result.push(h.clone());
        }
        if let Some(h) = &self.audio_header {
            result.push(h.clone());
        }
        result.extend(self.frames.iter().cloned());

        result
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Cached tag body bytes
    pub fn size(&self) -> usize {
        self.current_size
    }
}

impl Default for GopCache {
    fn default() -> Self {
        Self::new()
    }
}

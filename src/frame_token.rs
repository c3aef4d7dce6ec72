//! The opaque token returned by `begin_frame` and threaded through
//! `start_cmd_buffer`, `submit_cmd_buffers` and `end_frame`.
//!
//! Packs `{ctx_id: u16, max_inflight_frames: u8, frame_id: u8}` into a single
//! `u32` so it can be passed by value and compared cheaply, mirroring the
//! packed-handle style the backend uses for swapchain image indices.

/// A frame token: identifies which context a frame belongs to, the size of
/// that context's frame ring, and which ring slot is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u32);

impl FrameToken {
    pub fn encode(ctx_id: u16, max_inflight_frames: u8, frame_id: u8) -> Self {
        let packed = (ctx_id as u32) << 16 | (max_inflight_frames as u32) << 8 | frame_id as u32;
        Self(packed)
    }

    pub fn decode(self) -> (u16, u8, u8) {
        let ctx_id = (self.0 >> 16) as u16;
        let max_inflight_frames = (self.0 >> 8) as u8;
        let frame_id = self.0 as u8;
        (ctx_id, max_inflight_frames, frame_id)
    }

    pub fn ctx_id(self) -> u16 {
        self.decode().0
    }

    pub fn max_inflight_frames(self) -> u8 {
        self.decode().1
    }

    pub fn frame_id(self) -> u8 {
        self.decode().2
    }

    pub fn ring_slot(self) -> usize {
        self.frame_id() as usize % self.max_inflight_frames().max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_extremes() {
        for (ctx, frames, id) in [
            (0u16, 0u8, 0u8),
            (65535, 255, 255),
            (1, 3, 2),
            (12345, 2, 1),
        ] {
            let token = FrameToken::encode(ctx, frames, id);
            assert_eq!(token.decode(), (ctx, frames, id));
        }
    }

    #[test]
    fn round_trips_exhaustively_over_a_sample() {
        // exhaustive over all 65536*256*256 combinations is wasteful in a unit
        // test; sample densely over small ranges and the two extremes above.
        for ctx in 0u16..64 {
            for frames in 0u8..8 {
                for id in 0u8..8 {
                    let token = FrameToken::encode(ctx, frames, id);
                    assert_eq!(token.decode(), (ctx, frames, id));
                }
            }
        }
    }

    #[test]
    fn ring_slot_wraps() {
        let token = FrameToken::encode(0, 3, 4);
        assert_eq!(token.ring_slot(), 1);
    }
}

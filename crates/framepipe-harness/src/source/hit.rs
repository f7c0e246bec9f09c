use bytes::{Buf, BufMut, BytesMut};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use framepipe_frame::{
    body, body_mut, create_frame, fill_body, fill_header, required_capacity, FrameError, Pattern,
};

use super::{PayloadSource, SourceFuture};

/// Body bytes of one hit: timestamp, DOM id, source id, trigger mode.
pub const HIT_BODY_LEN: usize = 8 + 8 + 4 + 4;

/// Largest gap between consecutive hit timestamps, in milliseconds.
const MAX_HIT_GAP_MS: i64 = 10;

/// One synthetic hit as carried in a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub timestamp_ms: i64,
    pub dom_id: i64,
    pub source_id: i32,
    pub trigger_mode: i32,
}

impl Hit {
    /// Decode the hit carried by a frame built by [`HitSource`].
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        let mut body = body(frame)?;
        if body.len() < HIT_BODY_LEN {
            return Err(FrameError::Truncated {
                offset: 0,
                needed: HIT_BODY_LEN,
                len: body.len(),
            });
        }
        Ok(Self {
            timestamp_ms: body.get_i64(),
            dom_id: body.get_i64(),
            source_id: body.get_i32(),
            trigger_mode: body.get_i32(),
        })
    }
}

/// Endless source of synthetic hit frames.
///
/// Timestamps are run-relative and strictly increasing; DOM ids are drawn
/// uniformly from `0..num_doms`. The frame pattern field is Zero.
pub struct HitSource {
    source_id: u32,
    trigger_mode: i32,
    num_doms: u32,
    rng: ChaCha8Rng,
    clock_ms: i64,
}

impl HitSource {
    pub fn new(source_id: u32, trigger_mode: i32, num_doms: u32, rng: ChaCha8Rng) -> Self {
        Self {
            source_id,
            trigger_mode,
            num_doms: num_doms.max(1),
            rng,
            clock_ms: 0,
        }
    }

    fn next_hit(&mut self) -> Hit {
        self.clock_ms += self.rng.gen_range(1..=MAX_HIT_GAP_MS);
        Hit {
            timestamp_ms: self.clock_ms,
            dom_id: self.rng.gen_range(0..self.num_doms) as i64,
            source_id: self.source_id as i32,
            trigger_mode: self.trigger_mode,
        }
    }

    fn build(&mut self, seq: i32) -> Result<BytesMut, FrameError> {
        let hit = self.next_hit();
        let mut buf = BytesMut::zeroed(required_capacity(HIT_BODY_LEN));
        create_frame(&mut buf)?;
        fill_header(&mut buf, seq, Pattern::Zero)?;
        fill_body(&mut buf, HIT_BODY_LEN, &mut self.rng)?;

        let mut out = body_mut(&mut buf)?;
        out.put_i64(hit.timestamp_ms);
        out.put_i64(hit.dom_id);
        out.put_i32(hit.source_id);
        out.put_i32(hit.trigger_mode);
        Ok(buf)
    }
}

impl PayloadSource for HitSource {
    fn next_frame(&mut self, seq: i32) -> SourceFuture<'_> {
        let frame = self.build(seq);
        Box::pin(async move { Ok(Some(frame?)) })
    }

    fn kind(&self) -> &'static str {
        "hit"
    }
}

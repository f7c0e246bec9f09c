//! Payload sources: where a producer's frames come from.

mod file;
mod hit;
mod pattern;

use std::future::Future;
use std::pin::Pin;

use bytes::BytesMut;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use framepipe_channel::EndpointConfig;

use crate::config::{PayloadKind, SourceDescriptor};
use crate::error::Result;

pub use file::{split_records, FileSource, SplitSummary};
pub use hit::{Hit, HitSource, HIT_BODY_LEN};
pub use pattern::PatternSource;

/// Future returned by [`PayloadSource::next_frame`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<BytesMut>>> + Send + 'a>>;

/// Turns the next event into complete frame bytes.
pub trait PayloadSource: Send {
    /// Produce the frame for sequence number `seq`, or `None` once the
    /// source has nothing left.
    fn next_frame(&mut self, seq: i32) -> SourceFuture<'_>;

    /// Short label used in logs.
    fn kind(&self) -> &'static str;
}

/// Build the source a descriptor asks for.
pub async fn open_source(
    descriptor: &SourceDescriptor,
    endpoint: &EndpointConfig,
) -> Result<Box<dyn PayloadSource>> {
    let rng = seeded_rng(descriptor.seed);
    Ok(match &descriptor.payload {
        PayloadKind::Pattern { pattern, body_len } => {
            Box::new(PatternSource::new(*pattern, *body_len, rng))
        }
        PayloadKind::Hit => Box::new(HitSource::new(
            descriptor.source_id,
            descriptor.trigger_mode,
            descriptor.num_doms,
            rng,
        )),
        PayloadKind::File { path } => Box::new(FileSource::open(path, endpoint).await?),
    })
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

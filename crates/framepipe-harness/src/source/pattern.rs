use rand_chacha::ChaCha8Rng;

use framepipe_frame::{build_frame, Pattern};

use super::{PayloadSource, SourceFuture};

/// Endless source of pattern-filled frames with a fixed body length.
pub struct PatternSource {
    pattern: Pattern,
    body_len: usize,
    rng: ChaCha8Rng,
}

impl PatternSource {
    pub fn new(pattern: Pattern, body_len: usize, rng: ChaCha8Rng) -> Self {
        Self {
            pattern,
            body_len,
            rng,
        }
    }
}

impl PayloadSource for PatternSource {
    fn next_frame(&mut self, seq: i32) -> SourceFuture<'_> {
        let frame = build_frame(self.body_len, seq, self.pattern, &mut self.rng);
        Box::pin(async move { Ok(Some(frame?)) })
    }

    fn kind(&self) -> &'static str {
        "pattern"
    }
}

#[cfg(test)]
mod tests {
    use framepipe_frame::{verify_body, FrameHeader, Verification};
    use rand::SeedableRng;

    use super::*;

    #[tokio::test]
    async fn frames_carry_sequence_and_pattern() {
        let mut source = PatternSource::new(Pattern::Random, 77, ChaCha8Rng::seed_from_u64(1));
        for seq in 0..3 {
            let mut frame = source.next_frame(seq).await.unwrap().unwrap();
            let header = FrameHeader::parse(&frame).unwrap();
            assert_eq!(header.sequence_number, seq);
            assert_eq!(header.pattern, Pattern::Random);
            assert_eq!(header.body_length, 77);
            assert_eq!(verify_body(&mut frame).unwrap(), Verification::Valid);
        }
    }

    #[tokio::test]
    async fn same_seed_same_bodies() {
        let mut a = PatternSource::new(Pattern::Random, 32, ChaCha8Rng::seed_from_u64(9));
        let mut b = PatternSource::new(Pattern::Random, 32, ChaCha8Rng::seed_from_u64(9));
        assert_eq!(
            a.next_frame(0).await.unwrap(),
            b.next_frame(0).await.unwrap()
        );
    }
}

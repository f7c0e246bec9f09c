use std::ops::Range;
use std::path::PathBuf;

use framepipe_frame::{build_frame, Pattern};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub(crate) fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "framepipe-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Incrementing-pattern frames for `seqs`, back to back.
pub(crate) fn record_bytes(seqs: Range<i32>, body_len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mut out = Vec::new();
    for seq in seqs {
        let frame = build_frame(body_len, seq, Pattern::Incrementing, &mut rng)
            .expect("frame should build");
        out.extend_from_slice(&frame);
    }
    out
}

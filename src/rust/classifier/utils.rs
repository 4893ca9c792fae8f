use serde::{Deserialize, Serialize};

/// Row normalization applied to raw term counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Norm {
    /// Scale each row to unit euclidean length.
    #[default]
    L2,
    /// Scale each row so its weights sum to one.
    L1,
    /// Keep raw counts.
    None,
}

pub(crate) fn normalize_row(values: &mut [f32], norm: Norm) {
    let scale = match norm {
        Norm::L2 => values.iter().map(|&x| x * x).sum::<f32>().sqrt(),
        Norm::L1 => values.iter().map(|x| x.abs()).sum::<f32>(),
        Norm::None => return,
    };
    if scale > 1e-10 {
        values.iter_mut().for_each(|x| *x /= scale);
    }
}

/// Mixes a base seed with a stream index so that every consumer gets its
/// own random stream regardless of the order streams are requested in.
pub(crate) fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut z = base ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

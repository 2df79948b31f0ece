//! H.264 Annex B bitstream post-processing.
//!
//! The hardware encoder this server expects writes into an oversized output
//! buffer and only tells the caller the buffer's capacity, not how much of
//! it is real data. This module recovers the true length, classifies the
//! frame as an IDR or not, and maintains the process-wide SPS/PPS cache used
//! to prime newly-playing clients and to re-inject before every IDR.
//!
//! A single NAL-unit iterator ([`iter_annex_b`]) backs all three operations
//! plus the RTP packetizer and the Publisher Hub's fan-out — Annex B start
//! codes are walked in exactly one place.

use std::sync::Arc;

use parking_lot::RwLock;

/// NAL type 7 — Sequence Parameter Set.
pub const NAL_TYPE_SPS: u8 = 7;
/// NAL type 8 — Picture Parameter Set.
pub const NAL_TYPE_PPS: u8 = 8;
/// NAL type 5 — coded slice of an IDR picture.
pub const NAL_TYPE_IDR: u8 = 5;

/// Parameter sets are never expected to exceed this; longer ones are
/// truncated before caching (matches the reference implementation's
/// fixed 256-byte buffers).
pub const PARAM_SET_MAX_LEN: usize = 256;

/// A NAL unit found in an Annex B bitstream, including its start code.
///
/// `range` spans the start code through the end of the NAL payload;
/// `payload_start` is the offset within the *buffer* (not `range`) where
/// the NAL header byte begins — i.e. `range.start + start_code_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    pub start: usize,
    pub end: usize,
    pub payload_start: usize,
}

impl NalUnit {
    /// The NAL type (low 5 bits of the header byte), if the payload is non-empty.
    pub fn nal_type(&self, data: &[u8]) -> Option<u8> {
        data.get(self.payload_start).map(|b| b & 0x1f)
    }

    /// The NAL's bytes including its leading start code.
    pub fn with_start_code<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }

    /// The NAL's payload bytes, start code stripped (what the RTP packetizer wants).
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.payload_start..self.end]
    }
}

/// Walk `data` for Annex B start codes (`00 00 01` or `00 00 00 01`) and
/// yield one [`NalUnit`] per NAL found, in order.
///
/// This is the single NAL-scanning pass shared by [`extract_sps_pps`],
/// [`classify_and_find_idr`], and [`crate::media::h264::H264Packetizer`].
pub fn iter_annex_b(data: &[u8]) -> impl Iterator<Item = NalUnit> + '_ {
    let mut starts: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
            starts.push((i, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            starts.push((i, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    (0..starts.len()).filter_map(move |idx| {
        let (start, sc_len) = starts[idx];
        let end = starts
            .get(idx + 1)
            .map(|&(next_start, _)| next_start)
            .unwrap_or(data.len());
        let payload_start = start + sc_len;
        if payload_start >= end {
            return None;
        }
        Some(NalUnit {
            start,
            end,
            payload_start,
        })
    })
}

/// Strip a leading Annex B start code (`00 00 01` or `00 00 00 01`), if present.
pub fn strip_start_code(nal_with_sc: &[u8]) -> &[u8] {
    if nal_with_sc.starts_with(&[0, 0, 0, 1]) {
        &nal_with_sc[4..]
    } else if nal_with_sc.starts_with(&[0, 0, 1]) {
        &nal_with_sc[3..]
    } else {
        nal_with_sc
    }
}

/// Recover the true length of an encoder output buffer.
///
/// The encoder writes into a buffer sized for the worst case and leaves the
/// tail undefined. This walks backward from near the end of `buf[..cap]`
/// for a start code, then forward through that NAL until it finds a run of
/// at least 8 zero bytes (padding) or runs out of buffer. If no start code
/// is found within the search window, it falls back to locating the last
/// non-zero byte and rounding up to the next 4-byte boundary.
///
/// Mirrors the reference encoder's `find_h264_data_end` heuristic exactly;
/// the choice of an 8-byte zero run as the padding threshold is inherited
/// unchanged (see the design notes' open question on this heuristic).
pub fn find_data_end(buf: &[u8], cap: usize) -> usize {
    let cap = cap.min(buf.len());
    if cap < 10 {
        return last_nonzero_rounded(buf, cap);
    }

    let mut i = cap - 10;
    loop {
        if i + 2 < cap && buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            let mut j = i + 3;
            while j < cap {
                if buf[j] != 0 {
                    let mut k = j;
                    while k < cap {
                        if buf[k] == 0 {
                            let zero_start = k;
                            let mut z = k;
                            while z < cap && buf[z] == 0 {
                                z += 1;
                            }
                            if z - zero_start >= 8 {
                                return zero_start;
                            }
                            k = z;
                        } else {
                            k += 1;
                        }
                    }
                    return cap;
                }
                j += 1;
            }
        }

        if i == 0 {
            break;
        }
        i -= 1;
    }

    last_nonzero_rounded(buf, cap)
}

fn last_nonzero_rounded(buf: &[u8], cap: usize) -> usize {
    for i in (1..cap).rev() {
        if buf[i] != 0 {
            return (i + 4) & !3;
        }
    }
    cap
}

/// Scan `data[..len]` for the first IDR slice (NAL type 5).
///
/// Returns `true` as soon as one is found; does not distinguish multiple
/// slices within the same access unit.
pub fn classify_and_find_idr(data: &[u8], len: usize) -> bool {
    let data = &data[..len.min(data.len())];
    iter_annex_b(data).any(|nal| nal.nal_type(data) == Some(NAL_TYPE_IDR))
}

/// Process-wide, single-writer cache of the most recently observed SPS/PPS,
/// including their start codes. Populated once by [`extract_sps_pps`] and
/// read by the Publisher Hub to prime PLAY and to re-inject before IDRs.
#[derive(Debug, Default)]
struct ParamSetCache {
    sps: Vec<u8>,
    pps: Vec<u8>,
    captured: bool,
}

/// Shared handle to the parameter-set cache.
#[derive(Debug, Clone, Default)]
pub struct ParamSets {
    inner: Arc<RwLock<ParamSetCache>>,
}

impl ParamSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether both SPS and PPS have been captured.
    pub fn is_captured(&self) -> bool {
        self.inner.read().captured
    }

    /// Clone of the cached SPS, including its start code, if captured.
    pub fn sps(&self) -> Option<Vec<u8>> {
        let g = self.inner.read();
        g.captured.then(|| g.sps.clone())
    }

    /// Clone of the cached PPS, including its start code, if captured.
    pub fn pps(&self) -> Option<Vec<u8>> {
        let g = self.inner.read();
        g.captured.then(|| g.pps.clone())
    }

    /// Idempotent: once captured, further calls are no-ops (RFC 2326 frame-0
    /// assumption per the design notes — in practice this runs on every
    /// frame until the cache fills, not only frame 0, since the scan itself
    /// is cheap and the producer cannot always assume the very first frame
    /// is complete).
    fn set(&self, sps: &[u8], pps: &[u8]) {
        let mut g = self.inner.write();
        if g.captured {
            return;
        }
        let sps_len = sps.len().min(PARAM_SET_MAX_LEN);
        let pps_len = pps.len().min(PARAM_SET_MAX_LEN);
        g.sps = sps[..sps_len].to_vec();
        g.pps = pps[..pps_len].to_vec();
        g.captured = true;
        if sps.len() > PARAM_SET_MAX_LEN || pps.len() > PARAM_SET_MAX_LEN {
            tracing::warn!(
                sps_len = sps.len(),
                pps_len = pps.len(),
                "SPS/PPS exceeded cache size, truncated"
            );
        }
    }
}

/// Locate the first SPS and PPS in `data[..len]` and cache them (including
/// their start codes) in `cache`. Idempotent: a no-op once `cache` already
/// holds a captured pair. Logs a warning if the scan exhausts `len` before
/// finding both.
pub fn extract_sps_pps(data: &[u8], len: usize, cache: &ParamSets) {
    if cache.is_captured() {
        return;
    }

    let data = &data[..len.min(data.len())];
    let mut sps: Option<&[u8]> = None;
    let mut pps: Option<&[u8]> = None;

    for nal in iter_annex_b(data) {
        match nal.nal_type(data) {
            Some(NAL_TYPE_SPS) if sps.is_none() => sps = Some(nal.with_start_code(data)),
            Some(NAL_TYPE_PPS) if pps.is_none() => pps = Some(nal.with_start_code(data)),
            _ => {}
        }
        if sps.is_some() && pps.is_some() {
            break;
        }
    }

    match (sps, pps) {
        (Some(sps), Some(pps)) => {
            cache.set(sps, pps);
            tracing::debug!(sps_len = sps.len(), pps_len = pps.len(), "SPS/PPS cached");
        }
        _ => {
            tracing::warn!("SPS/PPS not both found in frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iter_annex_b_mixed_start_codes() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42];
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xCE]);
        let nals: Vec<_> = iter_annex_b(&data).collect();
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].payload(&data), &[0x67, 0x42]);
        assert_eq!(nals[1].payload(&data), &[0x68, 0xCE]);
    }

    #[test]
    fn iter_annex_b_empty() {
        assert!(iter_annex_b(&[]).next().is_none());
        assert!(iter_annex_b(&[0xFF, 0xFE]).next().is_none());
    }

    #[test]
    fn find_data_end_detects_padding_zero_run() {
        let mut buf = vec![0u8; 64];
        buf[0] = 0;
        buf[1] = 0;
        buf[2] = 1;
        buf[3] = 0x65;
        for (i, b) in [0xAAu8, 0xBB, 0xCC].into_iter().enumerate() {
            buf[4 + i] = b;
        }
        // bytes [7..] are already zero, providing an 8+ zero run as padding
        let end = find_data_end(&buf, buf.len());
        assert_eq!(end, 7);
    }

    #[test]
    fn find_data_end_fallback_last_nonzero() {
        let mut buf = vec![0u8; 32];
        buf[10] = 0xAB;
        let end = find_data_end(&buf, buf.len());
        assert_eq!(end, (10 + 4) & !3);
    }

    #[test]
    fn classify_idr_true_for_type_5() {
        let data = [0, 0, 0, 1, 0x65, 0xAA];
        assert!(classify_and_find_idr(&data, data.len()));
    }

    #[test]
    fn classify_idr_false_for_non_idr() {
        let data = [0, 0, 0, 1, 0x41, 0xAA];
        assert!(!classify_and_find_idr(&data, data.len()));
    }

    #[test]
    fn extract_sps_pps_caches_once() {
        let sps_nal = [0x67, 0x42, 0x00, 0x1e];
        let pps_nal = [0x68, 0xce, 0x38, 0x80];
        let frame = [
            &[0u8, 0, 0, 1][..],
            &sps_nal[..],
            &[0, 0, 0, 1][..],
            &pps_nal[..],
        ]
        .concat();

        let cache = ParamSets::new();
        extract_sps_pps(&frame, frame.len(), &cache);
        assert!(cache.is_captured());
        let sps = cache.sps().unwrap();
        assert_eq!(&sps[sps.len() - 4..], &sps_nal);

        // Idempotent: a different frame doesn't overwrite the cache.
        let other = [&[0u8, 0, 0, 1][..], &[0x67, 0x00, 0x00, 0x00][..]].concat();
        extract_sps_pps(&other, other.len(), &cache);
        let sps_again = cache.sps().unwrap();
        assert_eq!(sps_again, sps);
    }

    #[test]
    fn extract_sps_pps_warns_when_incomplete() {
        let cache = ParamSets::new();
        let frame = [0u8, 0, 0, 1, 0x67, 0x42];
        extract_sps_pps(&frame, frame.len(), &cache);
        assert!(!cache.is_captured());
    }

    #[test]
    fn extract_sps_pps_truncates_oversized() {
        let mut big_sps = vec![0x67u8];
        big_sps.extend(vec![0xAAu8; PARAM_SET_MAX_LEN + 50]);
        let pps_nal = [0x68, 0xce];
        let mut frame = vec![0, 0, 0, 1];
        frame.extend_from_slice(&big_sps);
        frame.extend_from_slice(&[0, 0, 0, 1]);
        frame.extend_from_slice(&pps_nal);

        let cache = ParamSets::new();
        extract_sps_pps(&frame, frame.len(), &cache);
        assert!(cache.is_captured());
        assert_eq!(cache.sps().unwrap().len(), PARAM_SET_MAX_LEN);
    }
}

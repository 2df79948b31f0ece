use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::Packetizer;
use super::rtp::RtpHeader;
use crate::bitstream::{self, ParamSets};

const MTU: usize = 1400;

/// H.264 RTP packetizer (RFC 6184).
///
/// Converts H.264 Annex B bitstreams into RTP packets. Supports two
/// packetization modes from RFC 6184:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within the MTU are sent
///   as-is in a single RTP packet (12-byte header + NAL bytes).
///
/// - **FU-A Fragmentation** (§5.8): NALs exceeding the MTU are split
///   across multiple RTP packets. Each fragment carries a 2-byte FU
///   header (FU indicator + FU header) before the NAL payload:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 2 bytes)
///   ```
///
///   - **S** (start): set on the first fragment
///   - **E** (end): set on the last fragment
///   - **NAL_Type**: the original NAL unit type from the first byte
///
/// NAL boundaries come from [`crate::bitstream::iter_annex_b`], the single
/// Annex B scanning pass this server uses everywhere.
///
/// ## SDP attributes (RFC 6184 §8.1)
///
/// - `a=rtpmap:96 H264/90000`
/// - `a=fmtp:96 packetization-mode=1`
/// - `a=control:track1`
///
/// SPS/PPS come from the shared [`ParamSets`] cache the Publisher Hub
/// populates (see [`crate::bitstream::extract_sps_pps`]); once present, the
/// fmtp line also carries `profile-level-id` and `sprop-parameter-sets`
/// (RFC 6184 §8.1).
///
/// ## Marker bit
///
/// Per RFC 6184 §5.1, the RTP marker bit is set on the last RTP packet
/// of an H.264 access unit (frame boundary).
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    params: ParamSets,
}

impl H264Packetizer {
    /// Create with explicit payload type, SSRC, and the shared parameter-set cache.
    pub fn new(pt: u8, ssrc: u32, params: ParamSets) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            params,
        }
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8, params: ParamSets) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            params,
        }
    }

    /// Derive profile-level-id from SPS NAL (RFC 6184 §8.1): bytes 1–3 are profile_idc, constraint_set, level_idc.
    ///
    /// `sps` must already have its start code stripped.
    fn profile_level_id(sps: &[u8]) -> Option<String> {
        if sps.len() < 4 {
            return None;
        }
        Some(format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
    }

    fn sprop_parameter_sets(sps: &[u8], pps: &[u8]) -> String {
        format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        )
    }

    /// Build the `a=fmtp` attribute value for `pt` given the current
    /// parameter-set cache. Before SPS/PPS are captured this falls back to
    /// the reference firmware's hardcoded `profile-level-id=42001f` guess;
    /// once real parameter sets are available, it reports the actual
    /// profile/level and includes `sprop-parameter-sets` (RFC 6184 §8.1).
    pub fn fmtp_value(pt: u8, params: &ParamSets) -> String {
        let mut fmtp = format!("{} packetization-mode=1", pt);

        match (params.sps(), params.pps()) {
            (Some(sps_with_sc), Some(pps_with_sc)) => {
                let sps = bitstream::strip_start_code(&sps_with_sc);
                let pps = bitstream::strip_start_code(&pps_with_sc);
                let pl = Self::profile_level_id(sps).unwrap_or_else(|| "42001f".to_string());
                fmtp.push_str(&format!(";profile-level-id={}", pl));
                fmtp.push_str(&format!(
                    ";sprop-parameter-sets={}",
                    Self::sprop_parameter_sets(sps, pps)
                ));
            }
            _ => fmtp.push_str(";profile-level-id=42001f"),
        }

        fmtp
    }

    /// Packetize a single NAL unit into one or more RTP packets.
    ///
    /// `nal_unit` excludes the Annex B start code; `nal_unit[0]` is the
    /// NAL header. If it fits within the MTU, it is sent as a Single NAL
    /// Unit packet (RFC 6184 §5.6). Otherwise, FU-A fragmentation is used
    /// (RFC 6184 §5.8).
    fn packetize_nal(&mut self, nal_unit: &[u8], is_last_nal: bool) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();

        if nal_unit.is_empty() {
            return packets;
        }

        if nal_unit.len() <= MTU {
            let hdr = self.header.write(is_last_nal);
            let mut packet = Vec::with_capacity(12 + nal_unit.len());
            packet.extend_from_slice(&hdr);
            packet.extend_from_slice(nal_unit);
            packets.push(packet);
        } else {
            let nal_header = nal_unit[0];
            let nal_type = nal_header & 0x1f;
            let nri = nal_header & 0x60;

            let fu_indicator = nri | 28;
            let payload = &nal_unit[1..];

            let max_fragment = MTU - 2;
            let mut offset = 0usize;
            let mut first = true;

            while offset < payload.len() {
                let remaining = payload.len() - offset;
                let last_fragment = remaining <= max_fragment;
                let chunk_size = std::cmp::min(max_fragment, remaining);
                let chunk = &payload[offset..offset + chunk_size];

                let start_bit = if first { 0x80 } else { 0x00 };
                let end_bit = if last_fragment { 0x40 } else { 0x00 };
                let fu_header = start_bit | end_bit | nal_type;

                let marker = is_last_nal && last_fragment;
                let hdr = self.header.write(marker);

                let mut packet = Vec::with_capacity(12 + 2 + chunk.len());
                packet.extend_from_slice(&hdr);
                packet.push(fu_indicator);
                packet.push(fu_header);
                packet.extend_from_slice(chunk);
                packets.push(packet);

                offset += chunk_size;
                first = false;
            }

            tracing::trace!(
                nal_type,
                nal_size = nal_unit.len(),
                fragments = packets.len(),
                "FU-A fragmented NAL unit"
            );
        }

        packets
    }

    /// Send a single NAL (start code excluded) at an explicit RTP timestamp
    /// (RFC 6184 §5). Every call is treated as its own access unit for
    /// marker-bit purposes — the reference implementation sets the marker
    /// bit on every non-fragmented packet, not only the last NAL of a
    /// frame, and the Publisher Hub ([`crate::hub::PublisherHub`]) calls
    /// this once per NAL in a frame plus twice more for SPS/PPS priming.
    pub fn send_nal(&mut self, nal: &[u8], ts: u32) -> Vec<Vec<u8>> {
        self.header.set_timestamp(ts as u64);
        self.packetize_nal(nal, true)
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        let nal_units: Vec<_> = bitstream::iter_annex_b(encoded_data).collect();
        let mut packets = Vec::new();

        for (i, nal) in nal_units.iter().enumerate() {
            let is_last = i == nal_units.len() - 1;
            packets.append(&mut self.packetize_nal(nal.payload(encoded_data), is_last));
        }

        self.header.advance_timestamp(timestamp_increment);

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            frame_bytes = encoded_data.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "frame packetized"
        );

        packets
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    /// 90 kHz clock rate per RFC 6184 §8.1.
    fn clock_rate(&self) -> u32 {
        90000
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    /// SDP attributes per RFC 6184 §8.2.1.
    ///
    /// Order matters — `a=rtpmap` defines the payload type and MUST precede
    /// `a=fmtp` which references it. ffplay and other clients parse attributes
    /// sequentially and expect this ordering.
    fn sdp_attributes(&self) -> Vec<String> {
        vec![
            format!(
                "a=rtpmap:{} {}/{}",
                self.payload_type(),
                self.codec_name(),
                self.clock_rate()
            ),
            format!("a=fmtp:{}", Self::fmtp_value(self.header.pt, &self.params)),
            "a=control:track1".to_string(),
        ]
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packetizer() -> H264Packetizer {
        H264Packetizer::new(96, 0xAABBCCDD, ParamSets::new())
    }

    #[test]
    fn small_nal_single_packet() {
        let mut p = make_packetizer();
        let nal = vec![0x65, 0xAA, 0xBB, 0xCC];
        let packets = p.packetize_nal(&nal, true);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 12 + 4);
        assert_eq!(packets[0][1] & 0x80, 0x80); // marker bit
    }

    #[test]
    fn large_nal_fragmented() {
        let mut p = H264Packetizer::new(96, 0x11223344, ParamSets::new());
        let mut nal = vec![0x65]; // NAL header
        nal.extend(vec![0xAA; MTU + 500]);
        let packets = p.packetize_nal(&nal, true);
        assert!(packets.len() > 1);

        assert_eq!(packets[0][12] & 0x1f, 28); // FU-A type
        assert_eq!(packets[0][13] & 0x80, 0x80); // Start bit

        let last = packets.last().unwrap();
        assert_eq!(last[13] & 0x40, 0x40); // End bit
        assert_eq!(last[1] & 0x80, 0x80); // Marker bit
    }

    #[test]
    fn empty_nal_no_packets() {
        let mut p = make_packetizer();
        assert!(p.packetize_nal(&[], true).is_empty());
    }

    #[test]
    fn packetize_trait_advances_timestamp() {
        let mut p = make_packetizer();
        let frame = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
        p.packetize(&frame, 3000);
        p.packetize(&frame, 3000);
        let packets = p.packetize(&frame, 3000);
        assert!(!packets.is_empty());
        assert_eq!(p.next_rtp_timestamp(), 9000);
    }

    #[test]
    fn sdp_attributes_without_params_have_no_sprop() {
        let p = make_packetizer();
        let attrs = p.sdp_attributes();
        assert!(attrs.iter().any(|a| a.contains("packetization-mode=1")));
        assert!(!attrs.iter().any(|a| a.contains("sprop-parameter-sets")));
    }

    #[test]
    fn codec_metadata() {
        let p = make_packetizer();
        assert_eq!(p.codec_name(), "H264");
        assert_eq!(p.clock_rate(), 90000);
        assert_eq!(p.payload_type(), 96);
    }

    #[test]
    fn sdp_attributes_reflect_captured_params() {
        let params = ParamSets::new();
        let sps_nal = [0u8, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e];
        let pps_nal = [0u8, 0, 0, 1, 0x68, 0xce, 0x38, 0x80];
        let frame = [&sps_nal[..], &pps_nal[..]].concat();
        bitstream::extract_sps_pps(&frame, frame.len(), &params);

        let p = H264Packetizer::new(96, 0xAABBCCDD, params);
        let attrs = p.sdp_attributes();
        let fmtp = attrs
            .iter()
            .find(|a| a.starts_with("a=fmtp:"))
            .expect("fmtp line");
        assert!(fmtp.contains("profile-level-id="));
        assert!(fmtp.contains("sprop-parameter-sets="));
    }

    #[test]
    fn send_nal_uses_explicit_timestamp() {
        let mut p = make_packetizer();
        let packets = p.send_nal(&[0x67, 0x42], 7000);
        assert_eq!(packets.len(), 1);
        let ts = u32::from_be_bytes([packets[0][4], packets[0][5], packets[0][6], packets[0][7]]);
        assert_eq!(ts, 7000);
        assert_eq!(p.next_rtp_timestamp(), 7000);
    }

    #[test]
    fn send_nal_always_sets_marker() {
        let mut p = make_packetizer();
        let packets = p.send_nal(&[0x65, 0xAA, 0xBB], 0);
        assert_eq!(packets[0][1] & 0x80, 0x80);
    }
}

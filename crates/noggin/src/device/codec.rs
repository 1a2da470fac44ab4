//! Framed binary protocol shared with the head firmware
//!
//! Outbound control frames are `START | cmd | payload | END`. There is no
//! length field: the end marker terminates the frame, so payload bytes must
//! never equal [`END`]. The command payloads built here satisfy that by
//! construction (indices, levels, and angles all stay below 0xBB, and
//! credential strings are UTF-8 text); the constraint is kept as-is for
//! compatibility with deployed firmware.

/// Frame start marker
pub const START: u8 = 0xAA;
/// Frame end marker
pub const END: u8 = 0xBB;

/// Indicator control (individual on/off or global level)
pub const CMD_INDICATOR: u8 = 0x01;
/// Servo angle control
pub const CMD_SERVO: u8 = 0x02;
/// Configuration and reboot
pub const CMD_CONFIG: u8 = 0x03;

/// Sub-command selecting the global indicator level
pub const INDICATOR_LEVEL: u8 = 0x06;
/// Configuration sub-command: set WiFi SSID
pub const CONFIG_SSID: u8 = 0x01;
/// Configuration sub-command: set WiFi password
pub const CONFIG_PASSWORD: u8 = 0x02;
/// Configuration sub-command: reboot the device
pub const CONFIG_REBOOT: u8 = 0x03;

/// Maximum angle accepted by the servo firmware
pub const MAX_SERVO_ANGLE: u8 = 180;
/// Maximum length of an SSID or password, in bytes
pub const MAX_CREDENTIAL_LEN: usize = 31;
/// Highest indicator level
pub const MAX_INDICATOR_LEVEL: u8 = 3;

/// A decoded protocol frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u8,
    pub payload: Vec<u8>,
}

/// Encode a command and payload into wire bytes
pub fn encode(cmd: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 3);
    frame.push(START);
    frame.push(cmd);
    frame.extend_from_slice(payload);
    frame.push(END);
    frame
}

/// Decode the first complete frame in `buf`
///
/// Returns the frame and the number of bytes consumed (including any noise
/// skipped before the start marker), or `None` if no complete frame is
/// present yet. Used by the device simulator and tests; the core itself only
/// encodes.
pub fn decode(buf: &[u8]) -> Option<(Frame, usize)> {
    let start = buf.iter().position(|&b| b == START)?;
    let cmd = *buf.get(start + 1)?;
    let body = &buf[start + 2..];
    let end = body.iter().position(|&b| b == END)?;

    let frame = Frame {
        cmd,
        payload: body[..end].to_vec(),
    };
    Some((frame, start + 2 + end + 1))
}

/// Payload for an individual indicator on/off
pub fn indicator_payload(index: u8, on: bool) -> Vec<u8> {
    vec![index, on as u8]
}

/// Payload for the global indicator level, clamped to 0–3
pub fn indicator_level_payload(level: u8) -> Vec<u8> {
    vec![INDICATOR_LEVEL, level.min(MAX_INDICATOR_LEVEL)]
}

/// Payload for a servo angle command, clamped to 0–180 before encoding
pub fn servo_payload(index: u8, angle: u8) -> Vec<u8> {
    vec![index, angle.min(MAX_SERVO_ANGLE)]
}

/// Payload for a credential update, or `None` if the value is too long
pub fn credential_payload(sub_cmd: u8, value: &str) -> Option<Vec<u8>> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_CREDENTIAL_LEN {
        return None;
    }
    let mut payload = Vec::with_capacity(bytes.len() + 1);
    payload.push(sub_cmd);
    payload.extend_from_slice(bytes);
    Some(payload)
}

/// Payload for the reboot request
pub fn reboot_payload() -> Vec<u8> {
    vec![CONFIG_REBOOT]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode(CMD_INDICATOR, &[4, 1]);
        assert_eq!(frame, vec![0xAA, 0x01, 0x04, 0x01, 0xBB]);
    }

    #[test]
    fn test_encode_empty_payload() {
        let frame = encode(CMD_CONFIG, &[]);
        assert_eq!(frame, vec![0xAA, 0x03, 0xBB]);
    }

    #[test]
    fn test_servo_angle_clamped_before_encoding() {
        // Any angle >= 180 must produce 180 (0xB4) on the wire
        for angle in [180u8, 181, 200, 255] {
            let frame = encode(CMD_SERVO, &servo_payload(2, angle));
            assert_eq!(frame, vec![0xAA, 0x02, 0x02, 0xB4, 0xBB]);
        }
    }

    #[test]
    fn test_servo_angle_in_range_untouched() {
        assert_eq!(servo_payload(3, 0), vec![3, 0]);
        assert_eq!(servo_payload(2, 90), vec![2, 90]);
        assert_eq!(servo_payload(2, 180), vec![2, 180]);
    }

    #[test]
    fn test_indicator_level_clamped() {
        assert_eq!(indicator_level_payload(2), vec![0x06, 2]);
        assert_eq!(indicator_level_payload(9), vec![0x06, 3]);
    }

    #[test]
    fn test_credential_payload_caps_length() {
        let ok = credential_payload(CONFIG_SSID, "garage-net").unwrap();
        assert_eq!(ok[0], 0x01);
        assert_eq!(&ok[1..], b"garage-net");

        let exactly_31 = "a".repeat(31);
        assert!(credential_payload(CONFIG_PASSWORD, &exactly_31).is_some());

        let too_long = "a".repeat(32);
        assert!(credential_payload(CONFIG_PASSWORD, &too_long).is_none());
    }

    #[test]
    fn test_decode_roundtrip() {
        let wire = encode(CMD_SERVO, &[2, 90]);
        let (frame, consumed) = decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(frame.cmd, CMD_SERVO);
        assert_eq!(frame.payload, vec![2, 90]);
    }

    #[test]
    fn test_decode_skips_leading_noise() {
        let mut wire = vec![0x00, 0x42];
        wire.extend(encode(CMD_INDICATOR, &[5, 0]));
        let (frame, consumed) = decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(frame.payload, vec![5, 0]);
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let wire = encode(CMD_SERVO, &[2, 90]);
        assert!(decode(&wire[..wire.len() - 1]).is_none());
        assert!(decode(&[]).is_none());
        assert!(decode(&[START]).is_none());
    }

    #[test]
    fn test_decode_two_frames_sequentially() {
        let mut wire = encode(CMD_INDICATOR, &[4, 1]);
        wire.extend(encode(CMD_INDICATOR, &[4, 0]));

        let (first, consumed) = decode(&wire).unwrap();
        assert_eq!(first.payload, vec![4, 1]);

        let (second, _) = decode(&wire[consumed..]).unwrap();
        assert_eq!(second.payload, vec![4, 0]);
    }
}

//! Parses raw turbine records and derives the 6-channel feature vector.
//! - Raw record: 20 comma-separated numeric fields (orientation quaternion, rotor, wind, voltage, ...)
//! - Feature vector: [roll, pitch, yaw, rotational_speed, wind, voltage]

use thiserror::Error;

use crate::config::RecordLayout;

pub const NUM_FEATURES: usize = 6;

pub const CHANNEL_NAMES: [&str; NUM_FEATURES] =
    ["roll", "pitch", "yaw", "rotational_speed", "wind", "voltage"];

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("field {index} is not numeric: '{token}'")]
    NotNumeric { index: usize, token: String },
}

/// One parsed raw record. Tokens are kept as received for forwarding upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    tokens: Vec<String>,
    values: Vec<f64>,
}

impl RawRecord {
    pub fn parse(line: &str, layout: &RecordLayout) -> Result<Self, FeatureError> {
        let tokens: Vec<String> = line
            .trim()
            .split(',')
            .map(|t| t.trim().to_string())
            .collect();

        if tokens.len() != layout.field_count {
            return Err(FeatureError::FieldCount {
                expected: layout.field_count,
                got: tokens.len(),
            });
        }

        let values = tokens
            .iter()
            .enumerate()
            .map(|(index, token)| {
                token
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| FeatureError::NotNumeric {
                        index,
                        token: token.clone(),
                    })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(Self { tokens, values })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Overwrites one field, keeping the forwarded token in sync.
    pub fn set_value(&mut self, index: usize, value: f64) {
        self.values[index] = value;
        self.tokens[index] = value.to_string();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; NUM_FEATURES]);

impl FeatureVector {
    pub fn from_record(record: &RawRecord, layout: &RecordLayout) -> Self {
        let (roll, pitch, yaw) = euler_from_quaternion(
            record.value(layout.qx),
            record.value(layout.qy),
            record.value(layout.qz),
            record.value(layout.qw),
        );

        Self([
            roll,
            pitch,
            yaw,
            record.value(layout.rotational_speed),
            record.value(layout.wind),
            record.value(layout.voltage),
        ])
    }

    pub fn channel(&self, c: usize) -> f64 {
        self.0[c]
    }
}

/// Record parsing bound to one field layout.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    layout: RecordLayout,
}

impl FeatureExtractor {
    pub fn new(layout: RecordLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn parse(&self, line: &str) -> Result<RawRecord, FeatureError> {
        RawRecord::parse(line, &self.layout)
    }

    pub fn features(&self, record: &RawRecord) -> FeatureVector {
        FeatureVector::from_record(record, &self.layout)
    }

    pub fn extract(&self, line: &str) -> Result<(RawRecord, FeatureVector), FeatureError> {
        let record = self.parse(line)?;
        let features = self.features(&record);
        Ok((record, features))
    }
}

/// Converts a quaternion (x, y, z, w) into (roll, pitch, yaw) radians.
///
/// Input is used as received, unit or not; the pitch argument is clamped to
/// [-1, 1] so the result stays finite at gimbal lock and for corrupted fields.
pub fn euler_from_quaternion(x: f64, y: f64, z: f64, w: f64) -> (f64, f64, f64) {
    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    (roll, pitch, yaw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn record_line(layout: &RecordLayout, q: [f64; 4], rot: f64, wind: f64, volt: f64) -> String {
        let mut fields = vec![0.0; layout.field_count];
        fields[layout.qx] = q[0];
        fields[layout.qy] = q[1];
        fields[layout.qz] = q[2];
        fields[layout.qw] = q[3];
        fields[layout.rotational_speed] = rot;
        fields[layout.wind] = wind;
        fields[layout.voltage] = volt;
        fields
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn identity_quaternion_gives_zero_angles() {
        let (r, p, y) = euler_from_quaternion(0.0, 0.0, 0.0, 1.0);
        assert_eq!((r, p, y), (0.0, 0.0, 0.0));
    }

    #[test]
    fn yaw_quarter_turn() {
        let h = FRAC_PI_2 / 2.0;
        let (r, p, y) = euler_from_quaternion(0.0, 0.0, h.sin(), h.cos());
        assert!(r.abs() < 1e-12);
        assert!(p.abs() < 1e-12);
        assert!((y - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn gimbal_lock_stays_finite() {
        // Pitch at +90 degrees.
        let h = FRAC_PI_2 / 2.0;
        let (r, p, y) = euler_from_quaternion(0.0, h.sin() * 1.0000001, 0.0, h.cos());
        assert!(r.is_finite() && p.is_finite() && y.is_finite());
        assert!((p - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn zero_quaternion_gives_zero_angles() {
        assert_eq!(euler_from_quaternion(0.0, 0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
    }

    #[test]
    fn all_zero_record_is_accepted() {
        let extractor = FeatureExtractor::new(RecordLayout::default());
        let (_, features) = extractor.extract(&vec!["0"; 20].join(",")).unwrap();
        assert_eq!(features.0, [0.0; 6]);
    }

    #[test]
    fn non_unit_quaternion_is_not_normalized() {
        // Same rotation axis at twice the norm.
        let (r1, _, _) = euler_from_quaternion(0.3, 0.0, 0.0, 0.954);
        let (r2, _, _) = euler_from_quaternion(0.6, 0.0, 0.0, 1.908);
        assert!((r1 - r2).abs() > 1e-3);
    }

    #[test]
    fn extracts_channels_in_order() {
        let layout = RecordLayout::default();
        let line = record_line(&layout, [0.0, 0.0, 0.0, 1.0], 12.5, 7.25, 230.0);
        let record = RawRecord::parse(&line, &layout).unwrap();
        let features = FeatureVector::from_record(&record, &layout);

        assert_eq!(features.0, [0.0, 0.0, 0.0, 12.5, 7.25, 230.0]);
        assert_eq!(record.tokens().len(), 20);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let layout = RecordLayout::default();
        let err = RawRecord::parse("1,2,3", &layout).unwrap_err();
        assert_eq!(err, FeatureError::FieldCount { expected: 20, got: 3 });
    }

    #[test]
    fn non_numeric_field_is_rejected() {
        let layout = RecordLayout::default();
        let mut line = record_line(&layout, [0.0, 0.0, 0.0, 1.0], 1.0, 1.0, 1.0);
        line.push_str("x");
        assert!(matches!(
            RawRecord::parse(&line, &layout),
            Err(FeatureError::NotNumeric { index: 19, .. })
        ));
    }

    #[test]
    fn extractor_drops_short_records() {
        let extractor = FeatureExtractor::new(RecordLayout::default());
        let line = vec!["1.0"; 19].join(",");
        assert!(extractor.extract(&line).is_err());
        let line = vec!["1.0"; 21].join(",");
        assert!(extractor.extract(&line).is_err());
    }

    #[test]
    fn set_value_updates_forwarded_token() {
        let layout = RecordLayout::default();
        let line = record_line(&layout, [0.0, 0.0, 0.0, 1.0], 1.0, 1.0, 1.0);
        let mut record = RawRecord::parse(&line, &layout).unwrap();
        record.set_value(layout.voltage, 999.0);
        assert_eq!(record.value(layout.voltage), 999.0);
        assert_eq!(record.tokens()[layout.voltage], "999");
    }
}

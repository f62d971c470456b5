//! Index sidecar parsing.
//!
//! Record format (wgrib2 inventory):
//! `recordNo:byteOffset:d=YYYYMMDDHH:SHORT:LEVEL:STEP:...`
//!
//! The step field carries both the step range and the statistical type,
//! e.g. `anl`, `6 hour fcst`, `0-6 hour ave fcst`, `0-1 hour acc fcst`,
//! `30 min fcst`.

/// Statistical processing of a message over its step range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    Instant,
    Avg,
    Acc,
    Max,
    Min,
}

/// One parsed index record.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub record_no: u32,
    pub byte_offset: u64,
    pub short_name: String,
    pub level: String,
    pub step: String,
    /// The raw line, used for selector substring matching.
    pub line: String,
}

/// Attributes of a decoded message, derived from its index record.
#[derive(Debug, Clone)]
pub struct MessageAttributes {
    pub short_name: String,
    pub level: String,
    pub step_type: StepType,
    /// Step range in minutes; equal endpoints for instantaneous steps.
    pub step_range: (u32, u32),
}

impl MessageAttributes {
    pub fn from_record(record: &IndexRecord) -> Self {
        let (step_type, step_range) = parse_step(&record.step);
        Self {
            short_name: record.short_name.clone(),
            level: record.level.clone(),
            step_type,
            step_range,
        }
    }

    /// Valid-time offset of the step in minutes.
    pub fn step_minutes(&self) -> u32 {
        self.step_range.1
    }
}

/// Parse an index sidecar. Malformed lines are skipped.
pub fn parse_index(text: &str) -> Vec<IndexRecord> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.splitn(7, ':');
            let record_no = fields.next()?.parse().ok()?;
            let byte_offset = fields.next()?.parse().ok()?;
            let _date = fields.next()?;
            let short_name = fields.next()?.to_string();
            let level = fields.next()?.to_string();
            let step = fields.next()?.to_string();
            Some(IndexRecord {
                record_no,
                byte_offset,
                short_name,
                level,
                step,
                line: line.to_string(),
            })
        })
        .collect()
}

/// Byte range of record `i`: `[offset, next_offset)`, open-ended for the
/// last record.
pub fn byte_range(records: &[IndexRecord], i: usize) -> (u64, Option<u64>) {
    let start = records[i].byte_offset;
    let end = records.get(i + 1).map(|r| r.byte_offset);
    (start, end)
}

/// Parse a step string into its type and range in minutes.
fn parse_step(step: &str) -> (StepType, (u32, u32)) {
    let step = step.trim();
    if step == "anl" {
        return (StepType::Instant, (0, 0));
    }

    let mut tokens: Vec<&str> = step.split_whitespace().collect();
    if tokens.last() == Some(&"fcst") {
        tokens.pop();
    }
    let step_type = match tokens.last() {
        Some(&"ave") => {
            tokens.pop();
            StepType::Avg
        }
        Some(&"acc") | Some(&"accum") => {
            tokens.pop();
            StepType::Acc
        }
        Some(&"max") => {
            tokens.pop();
            StepType::Max
        }
        Some(&"min") if tokens.len() % 2 == 1 => {
            // Trailing "min" with an odd token count is the statistical
            // type, not the minute unit ("0-60 min min fcst").
            tokens.pop();
            StepType::Min
        }
        _ => StepType::Instant,
    };

    let mut start: Option<u32> = None;
    let mut end: u32 = 0;
    for pair in tokens.chunks(2) {
        let [value, unit] = pair else { continue };
        let unit_minutes = match *unit {
            "min" => 1,
            "hour" => 60,
            "day" => 1440,
            _ => continue,
        };
        if let Some((a, b)) = value.split_once('-') {
            if let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) {
                start = Some(a * unit_minutes);
                end = b * unit_minutes;
            }
        } else if let Ok(v) = value.parse::<u32>() {
            end += v * unit_minutes;
        }
    }

    (step_type, (start.unwrap_or(end), end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
1:0:d=2024010100:PRMSL:mean sea level:anl:
2:738normal:d=2024010100:bad:line
3:990143:d=2024010100:TMP:2 m above ground:6 hour fcst:
4:1569879:d=2024010100:PRATE:surface:0-6 hour ave fcst:
5:2192992:d=2024010100:APCP:surface:0-6 hour acc fcst:
6:2491842:d=2024010100:TMAX:2 m above ground:0-6 hour max fcst:
";

    #[test]
    fn test_parse_index_skips_malformed() {
        let records = parse_index(SAMPLE);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].short_name, "PRMSL");
        assert_eq!(records[1].byte_offset, 990143);
        assert_eq!(records[1].level, "2 m above ground");
    }

    #[test]
    fn test_byte_ranges() {
        let records = parse_index(SAMPLE);
        assert_eq!(byte_range(&records, 0), (0, Some(990143)));
        assert_eq!(byte_range(&records, 4), (2491842, None));
    }

    #[test]
    fn test_step_parsing() {
        assert_eq!(parse_step("anl"), (StepType::Instant, (0, 0)));
        assert_eq!(parse_step("6 hour fcst"), (StepType::Instant, (360, 360)));
        assert_eq!(parse_step("0-6 hour ave fcst"), (StepType::Avg, (0, 360)));
        assert_eq!(parse_step("0-1 hour acc fcst"), (StepType::Acc, (0, 60)));
        assert_eq!(parse_step("2-3 hour max fcst"), (StepType::Max, (120, 180)));
        assert_eq!(parse_step("30 min fcst"), (StepType::Instant, (30, 30)));
        assert_eq!(
            parse_step("1 hour 15 min fcst"),
            (StepType::Instant, (75, 75))
        );
        assert_eq!(parse_step("123 hour fcst"), (StepType::Instant, (7380, 7380)));
    }

    #[test]
    fn test_attributes_from_record() {
        let records = parse_index(SAMPLE);
        let attrs = MessageAttributes::from_record(&records[2]);
        assert_eq!(attrs.short_name, "PRATE");
        assert_eq!(attrs.step_type, StepType::Avg);
        assert_eq!(attrs.step_range, (0, 360));
        assert_eq!(attrs.step_minutes(), 360);
    }

    #[test]
    fn test_selector_substring_matches_line() {
        let records = parse_index(SAMPLE);
        let matched: Vec<_> = records
            .iter()
            .filter(|r| r.line.contains(":TMP:2 m above ground:"))
            .collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].record_no, 3);
    }
}

use std::{fs::File, io::Write};

use chrono::{DateTime, Utc};
use clock_servo::sim::{Observer, RunSummary, Sample};
use csv::Writer;
use serde::Serialize;

use crate::configs::RunnerConfig;

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    started_at: String,
    finished_at: String,
    config: &'a RunnerConfig,
    summary: &'a RunSummary,
}

/// Samples collected from a run, kept in memory until the run ends.
#[derive(Debug, Default)]
pub struct SampleLog {
    samples: Vec<Sample>,
}

impl SampleLog {
    pub fn new() -> Self {
        SampleLog {
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), std::io::Error> {
        let mut writer = Writer::from_writer(writer);
        for sample in &self.samples {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv(&self, file_path: &str) -> Result<(), std::io::Error> {
        self.write_csv(File::create(file_path)?)
    }

    pub fn save_summary(
        &self,
        file_path: &str,
        config: &RunnerConfig,
        summary: &RunSummary,
        started_at: DateTime<Utc>,
    ) -> Result<(), std::io::Error> {
        let report = RunReport {
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            config,
            summary,
        };
        let report_json = serde_json::to_string_pretty(&report)?;
        let mut summary_file = File::create(file_path)?;
        summary_file.write_all(report_json.as_bytes())?;
        summary_file.flush()?;
        Ok(())
    }
}

impl Observer for SampleLog {
    fn observe(&mut self, sample: &Sample) {
        self.samples.push(*sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_has_header_and_one_row_per_sample() {
        let mut log = SampleLog::new();
        log.observe(&Sample {
            time: 1.5,
            master_time: 10,
            slave_time: 12,
            error: -2,
            correction_freq: -0.25,
            phase_accumulator: 0.5,
        });

        let mut out = Vec::new();
        log.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "time,master_time,slave_time,error,correction_freq,phase_accumulator\n\
             1.5,10,12,-2,-0.25,0.5\n"
        );
        assert_eq!(log.len(), 1);
    }
}

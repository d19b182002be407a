// Per-session CSV log (spec.md section 6): one row every sample interval,
// written to `{start_unixtime}-{remote_ip}-{remote_port}.csv`. No `csv`
// crate appears anywhere in the example pack's Cargo.toml files, so this
// writes the fixed column set directly rather than adding a dependency
// for it.

use ledbat::session::SessionSnapshot;
use std::fs::File;
use std::io::Write;

pub struct CsvLog {
    file: File,
}

const HEADER: &str = "Time,Sent,Resent,Acked,Cwnd,Flightsz,Queuing_delay,Rtt,Srtt,Rttvar\n";

impl CsvLog {
    pub fn create(remote_ip: &str, remote_port: u16, start_unixtime: u64) -> Result<CsvLog, String> {
        let filename = format!("{}-{}-{}.csv", start_unixtime, remote_ip, remote_port);
        let mut file = File::create(&filename).map_err(|e| format!("creating {}: {}", filename, e))?;
        file.write_all(HEADER.as_bytes())
            .map_err(|e| format!("writing header to {}: {}", filename, e))?;
        Ok(CsvLog { file })
    }

    pub fn record(&mut self, snapshot: SessionSnapshot) -> Result<(), String> {
        let rtt = snapshot.rtt.map(|r| r.to_string()).unwrap_or_default();
        writeln!(
            self.file,
            "{:.3},{},{},{},{},{},{:.3},{},{:.6},{:.6}",
            snapshot.elapsed.as_secs_f64(),
            snapshot.chunks_sent,
            snapshot.chunks_resent,
            snapshot.chunks_acked,
            snapshot.cwnd,
            snapshot.flightsize,
            snapshot.queuing_delay,
            rtt,
            snapshot.srtt,
            snapshot.rttvar,
        )
        .map_err(|e| format!("writing CSV row: {}", e))?;
        Ok(())
    }
}

//! Multi-threaded recording stress test.
//!
//! ```bash
//! gpubridge-stress --workers 8 --passes 1000 --fault-every 10
//! ```

use std::process::ExitCode;

use gpubridge_app::{App, StressArgs};

fn main() -> ExitCode {
    let args = StressArgs::parse();
    match App::run(args) {
        Ok(report) => {
            println!(
                "{} worker(s): {} finished, {} aborted, {} bundle(s), {} draw(s), {} dispatch(es), {} handle(s) released in {:?}",
                report.workers,
                report.passes_finished,
                report.passes_aborted,
                report.bundles,
                report.draws,
                report.dispatches,
                report.handles_released,
                report.elapsed
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Stress run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

use std::{
    cell::RefCell,
    collections::HashSet,
    io::{self, Write},
    time::Duration,
};

use tokio::{
    select,
    signal::unix::{SignalKind, signal},
    time::sleep,
};
use tracing::{error, info, trace};

use crate::{
    command::CommandRunner,
    config::Config,
    correlate::correlate,
    errors::CycleError,
    frame::Frame,
    host::PsLookup,
    render::{render_frame, style::CLEAR_SCREEN},
    session::Session,
    smi::{ProcessGpuRecord, query_snapshot},
};

// Runs the refresh pipeline for a fixed set of devices
pub struct Monitor {
    runner: Box<dyn CommandRunner>,
    session: Session,
    config: Config,
    selection: Vec<u32>,

    // Pids whose unreadable ps output was already logged
    reported: RefCell<HashSet<u32>>,
}

impl Monitor {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        session: Session,
        config: Config,
        selection: Vec<u32>,
    ) -> Self {
        Self {
            runner,
            session,
            config,
            selection,
            reported: RefCell::new(HashSet::new()),
        }
    }

    /// Take one snapshot, join it with the host process table and
    /// keep the selected devices.
    pub fn refresh(&self) -> Result<Frame, CycleError> {
        let snapshot = query_snapshot(
            self.runner.as_ref(),
            &self.config.nvidia_smi,
            &self.session.gpus,
        )?;

        // Processes on hidden devices are never shown, skip their lookups
        let shown: Vec<ProcessGpuRecord> = snapshot
            .processes
            .iter()
            .filter(|p| self.selection.contains(&p.device_index))
            .cloned()
            .collect();

        let lookup = PsLookup::new(self.runner.as_ref(), self.config.ps.as_str());
        let rows = correlate(&shown, &lookup, &mut self.reported.borrow_mut())?;

        trace!("Correlated {} process rows", rows.len());

        Ok(Frame::assemble(snapshot, rows, &self.selection))
    }

    // Render a frame for the terminal
    pub fn draw(&self, frame: &Frame) -> String {
        render_frame(frame, &self.session.render_options(&self.config))
    }

    /// Redraw the dashboard every `interval` until SIGINT or SIGTERM.
    ///
    /// A failed refresh shows the error in place of the dashboard and
    /// the next one is tried on schedule.
    pub async fn run(&self, interval: Duration) -> io::Result<()> {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        loop {
            let screen = match self.refresh() {
                Ok(frame) => self.draw(&frame),
                Err(err) => {
                    error!("Refresh failed: {err}");
                    format!("Refresh failed: {err}")
                }
            };

            {
                let mut stdout = io::stdout().lock();
                writeln!(stdout, "{CLEAR_SCREEN}{screen}")?;
                stdout.flush()?;
            }

            select! {
                _ = interrupt.recv() => {
                    info!("Interrupted, exiting");
                    break;
                },
                _ = terminate.recv() => {
                    info!("Terminated, exiting");
                    break;
                },
                _ = sleep(interval) => {},
            }
        }

        Ok(())
    }
}

//! Background bulk propagation
//!
//! A single worker thread owns a [`Propagator`] and runs requests in the
//! order they arrive. Each submission gets a [`PropagationHandle`] for
//! polling, waiting or cancelling; cancellation takes effect between
//! integration steps.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use super::propagator::{CancellationToken, PropagationRequest, PropagationResult, Propagator};
use super::settings::SimulationSettings;
use crate::bodies::BodyRegistry;
use crate::error::PropagationError;

type JobResult = Result<PropagationResult, PropagationError>;

enum WorkerCommand {
    Propagate {
        request: Box<PropagationRequest>,
        bodies: Box<BodyRegistry>,
        cancel: CancellationToken,
        reply: Sender<JobResult>,
    },
    Stop,
}

pub struct PropagationWorker {
    sender: Sender<WorkerCommand>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PropagationWorker {
    pub fn new(propagator: Propagator) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>();

        let handle = thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                match command {
                    WorkerCommand::Propagate {
                        request,
                        bodies,
                        cancel,
                        reply,
                    } => {
                        let result = propagator
                            .trajectory(*request, &bodies)
                            .map(|t| t.with_cancellation(cancel).collect_result());
                        // The handle may have been dropped; nothing to report to
                        let _ = reply.send(result);
                    }
                    WorkerCommand::Stop => break,
                }
            }
            log::debug!("Propagation worker exiting");
        });

        Self {
            sender: cmd_tx,
            handle: Some(handle),
        }
    }

    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self::new(Propagator::from_settings(settings))
    }

    /// Queue a propagation against a snapshot of `bodies`
    pub fn submit(&self, request: PropagationRequest, bodies: &BodyRegistry) -> PropagationHandle {
        let (reply_tx, reply_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let command = WorkerCommand::Propagate {
            request: Box::new(request),
            bodies: Box::new(bodies.clone()),
            cancel: cancel.clone(),
            reply: reply_tx,
        };
        if self.sender.send(command).is_err() {
            log::warn!("Propagation submitted to a stopped worker");
        }
        PropagationHandle {
            cancel,
            receiver: reply_rx,
            result: None,
        }
    }

    /// Stop after the current job and wait for the thread to exit
    pub fn stop(&mut self) {
        let _ = self.sender.send(WorkerCommand::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Propagation worker panicked");
            }
        }
    }
}

impl Drop for PropagationWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pending result of a submitted propagation
pub struct PropagationHandle {
    cancel: CancellationToken,
    receiver: Receiver<JobResult>,
    result: Option<JobResult>,
}

impl PropagationHandle {
    /// Ask the worker to stop this job at the next step boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The result, if the job has finished; never blocks
    pub fn try_result(&mut self) -> Option<&JobResult> {
        if self.result.is_none() {
            match self.receiver.try_recv() {
                Ok(result) => self.result = Some(result),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => self.result = Some(Err(PropagationError::WorkerStopped)),
            }
        }
        self.result.as_ref()
    }

    /// Block until the job finishes
    pub fn wait(self) -> JobResult {
        match self.result {
            Some(result) => result,
            None => self
                .receiver
                .recv()
                .unwrap_or(Err(PropagationError::WorkerStopped)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::test_support::*;
    use crate::propagation::forces::ForceOptions;
    use crate::propagation::propagator::PropagationStatus;
    use crate::propagation::{OrbitalState, SpacecraftState};
    use crate::time::Epoch;
    use nalgebra::Vector3;

    fn worker() -> PropagationWorker {
        PropagationWorker::from_settings(&SimulationSettings {
            forces: ForceOptions::two_body(),
            ..Default::default()
        })
    }

    fn leo() -> SpacecraftState {
        let r = 7000.0;
        SpacecraftState::with_defaults(
            OrbitalState::new(
                Vector3::new(r, 0.0, 0.0),
                Vector3::new(0.0, (MU_EARTH / r).sqrt(), 0.0),
                Epoch::J2000,
            ),
            399,
        )
    }

    #[test]
    fn test_jobs_complete_in_order() {
        let registry = earth_only();
        let worker = worker();
        let first = worker.submit(PropagationRequest::new(leo(), 600.0).with_step(60.0), &registry);
        let second = worker.submit(PropagationRequest::new(leo(), 1200.0).with_step(60.0), &registry);

        let second = second.wait().unwrap();
        let mut first = first;
        let done = first.try_result().unwrap().as_ref().unwrap();
        assert_eq!(done.samples.len(), 11);
        assert_eq!(second.samples.len(), 21);
        assert!(second.is_complete());
    }

    #[test]
    fn test_cancel_long_job() {
        let registry = earth_only();
        let worker = worker();
        let handle = worker.submit(
            PropagationRequest::new(leo(), 1.0e9).with_step(1.0),
            &registry,
        );
        handle.cancel();
        assert!(handle.is_cancelled());

        let result = handle.wait().unwrap();
        assert_eq!(result.status, PropagationStatus::Cancelled);
        assert!(!result.samples.is_empty());
    }

    #[test]
    fn test_invalid_request_reports_error() {
        let registry = earth_only();
        let worker = worker();
        let handle = worker.submit(PropagationRequest::new(leo(), -1.0), &registry);
        assert!(matches!(
            handle.wait(),
            Err(PropagationError::BackwardPropagation { .. })
        ));
    }

    #[test]
    fn test_stopped_worker_reports_error() {
        let registry = earth_only();
        let mut worker = worker();
        worker.stop();
        let mut handle = worker.submit(PropagationRequest::new(leo(), 60.0), &registry);
        assert!(matches!(handle.try_result(), Some(Err(PropagationError::WorkerStopped))));
    }
}

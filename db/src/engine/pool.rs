//! Worker pool for background destruction. The event loop hands over
//! entries it has already unlinked from the keyspace, so workers get
//! exclusive ownership and the loop thread never pays for freeing a large
//! container.

use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct ThreadPool {
    sender: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub(crate) fn new(size: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..size)
            .map(|idx| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("Worker-{idx}"))
                    .spawn(move || {
                        // runs until the sending side is dropped
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("could not spawn worker thread")
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            // send only fails when all workers are gone, which only
            // happens during teardown
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for ThreadPool {
    /// Closes the queue and joins the workers; pending jobs are drained
    /// before the threads exit.
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("worker thread panicked during shutdown");
            }
        }
    }
}

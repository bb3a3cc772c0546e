//! Small fixed worker pool that sends messages without blocking the page loop.

use super::channels::Channel;
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct Job {
    channel: Arc<dyn Channel>,
    message: Arc<str>,
}

pub struct NotificationPool {
    channels: Vec<Arc<dyn Channel>>,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl NotificationPool {
    pub fn new(channels: Vec<Arc<dyn Channel>>, workers: usize) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let workers = (0..workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || {
                    for job in rx.iter() {
                        if let Err(e) = job.channel.send(&job.message) {
                            log::error!("[!] {} notification failed: {:#}", job.channel.name(), e);
                        }
                    }
                })
            })
            .collect();
        Self {
            channels,
            tx: Some(tx),
            workers,
        }
    }

    /// Queues `message` once per channel.
    pub fn submit(&self, message: &str) {
        let Some(tx) = &self.tx else { return };
        let message: Arc<str> = Arc::from(message);
        for channel in &self.channels {
            let job = Job {
                channel: Arc::clone(channel),
                message: Arc::clone(&message),
            };
            if tx.send(job).is_err() {
                log::error!("[!] Notification workers are gone; dropping message");
                return;
            }
        }
    }

    /// Stops accepting work and waits for the queue to drain.
    pub fn shutdown(mut self) {
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

//! In-process pub/sub topics.
//!
//! A `Topic` fans one stream of messages out to any number of subscribers
//! over crossbeam channels. Publishing never blocks; subscribers that have
//! been dropped are pruned on the next publish.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::types::{PoseStamped, RecoveryStatus, Twist};

/// Fan-out publisher for one message type.
pub struct Topic<T> {
    subscribers: Arc<Mutex<Vec<Sender<T>>>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Topic<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Open a new subscription. Messages published before this call are
    /// not delivered.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver a message to all live subscribers.
    pub fn publish(&self, msg: T) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(msg.clone()).is_ok());
    }
}

/// The coordinator's output topics.
#[derive(Clone)]
pub struct NavTopics {
    /// Velocity commands for the base
    pub cmd_vel: Topic<Twist>,
    /// Active goal, in the planning frame
    pub current_goal: Topic<PoseStamped>,
    /// Goals wrapped from the bare-pose topic, republished for tooling
    pub action_goal: Topic<PoseStamped>,
    /// Recovery ladder progress
    pub recovery_status: Topic<RecoveryStatus>,
}

impl NavTopics {
    pub fn new() -> Self {
        Self {
            cmd_vel: Topic::new(),
            current_goal: Topic::new(),
            action_goal: Topic::new(),
            recovery_status: Topic::new(),
        }
    }

    /// Command the base to stop.
    pub fn publish_zero_velocity(&self) {
        self.cmd_vel.publish(Twist::ZERO);
    }
}

impl Default for NavTopics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let topic: Topic<u32> = Topic::new();
        let a = topic.subscribe();
        let b = topic.subscribe();

        topic.publish(7);
        assert_eq!(a.recv().unwrap(), 7);
        assert_eq!(b.recv().unwrap(), 7);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let topic: Topic<u32> = Topic::new();
        let a = topic.subscribe();
        drop(topic.subscribe());

        topic.publish(1);
        topic.publish(2);
        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_zero_velocity_helper() {
        let topics = NavTopics::new();
        let rx = topics.cmd_vel.subscribe();
        topics.publish_zero_velocity();
        assert!(rx.recv().unwrap().is_zero());
    }
}

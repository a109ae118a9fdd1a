//! Serialized work queue
//!
//! A [`TaskScheduler`] is a FIFO of work items owned by exactly one consumer.
//! Producers (I/O tasks, timer callbacks, router handles) hold
//! [`TaskPoster`]s. Once the scheduler is dropped every poster turns into a
//! no-op, which is how in-flight completions become harmless after their
//! owner has been destroyed.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cloneable producer side of a [`TaskScheduler`]
pub struct TaskPoster<T> {
    post: Arc<dyn Fn(T) -> bool + Send + Sync>,
}

impl<T> Clone for TaskPoster<T> {
    fn clone(&self) -> Self {
        Self {
            post: self.post.clone(),
        }
    }
}

impl<T> fmt::Debug for TaskPoster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPoster").finish()
    }
}

impl<T: 'static> TaskPoster<T> {
    /// Create a poster from an arbitrary post function
    pub fn from_fn<F>(post: F) -> Self
    where
        F: Fn(T) -> bool + Send + Sync + 'static,
    {
        Self {
            post: Arc::new(post),
        }
    }

    /// Enqueue a work item
    ///
    /// Returns `false` if the owning scheduler no longer exists.
    pub fn post(&self, task: T) -> bool {
        (self.post)(task)
    }

    /// Derive a poster for another item type that wraps items into `T`
    pub fn map<U, F>(&self, wrap: F) -> TaskPoster<U>
    where
        U: 'static,
        F: Fn(U) -> T + Send + Sync + 'static,
    {
        let inner = self.post.clone();
        TaskPoster {
            post: Arc::new(move |task| inner(wrap(task))),
        }
    }
}

/// FIFO queue of work items executed by a single owner
pub struct TaskScheduler<T> {
    name: String,
    sender: mpsc::UnboundedSender<T>,
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> fmt::Debug for TaskScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("name", &self.name)
            .field("queued", &self.receiver.len())
            .finish()
    }
}

impl<T: Send + 'static> TaskScheduler<T> {
    /// Create a new empty scheduler
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sender,
            receiver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a producer handle
    ///
    /// The poster holds only a weak reference to the queue, so outstanding
    /// posters never keep a dropped scheduler alive.
    pub fn poster(&self) -> TaskPoster<T> {
        let weak = self.sender.downgrade();
        TaskPoster::from_fn(move |task| match weak.upgrade() {
            Some(sender) => sender.send(task).is_ok(),
            None => false,
        })
    }

    /// Enqueue a work item from the owner itself
    pub fn post(&self, task: T) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.sender.send(task);
    }

    /// Take the next queued item without waiting
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next item
    pub async fn next(&mut self) -> T {
        loop {
            // `self.sender` keeps the channel open, so `recv` never yields None.
            if let Some(task) = self.receiver.recv().await {
                return task;
            }
        }
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

use std::sync::mpsc::{self, TryRecvError};

use super::RemoteError;

/// State of a [`Pending`] result at the moment it is polled.
#[derive(Debug)]
pub enum Completion<T> {
    Done(Result<T, RemoteError>),
    Waiting,
    /// The completing side was dropped without producing a result.
    Abandoned,
}

/// Result of a remote operation that may not have completed yet.
///
/// Polling never blocks, the event loop checks pending results after every event it handles.
#[derive(Debug)]
pub struct Pending<T> {
    rx: mpsc::Receiver<Result<T, RemoteError>>,
}

/// Producing half of a [`Pending`].
#[derive(Debug)]
pub struct Completer<T> {
    tx: mpsc::Sender<Result<T, RemoteError>>,
}

pub fn pending<T>() -> (Completer<T>, Pending<T>) {
    let (tx, rx) = mpsc::channel();
    (Completer { tx }, Pending { rx })
}

impl<T> Completer<T> {
    pub fn complete(self, result: Result<T, RemoteError>) {
        // the waiting side may already be gone, nobody is interested in the result then
        let _ = self.tx.send(result);
    }

    pub fn resolve(self, value: T) {
        self.complete(Ok(value))
    }

    pub fn reject(self, err: RemoteError) {
        self.complete(Err(err))
    }
}

impl<T> Pending<T> {
    pub fn ready(result: Result<T, RemoteError>) -> Self {
        let (completer, pending) = pending();
        completer.complete(result);
        pending
    }

    pub fn resolved(value: T) -> Self {
        Self::ready(Ok(value))
    }

    pub fn rejected(err: RemoteError) -> Self {
        Self::ready(Err(err))
    }

    pub fn poll(&mut self) -> Completion<T> {
        match self.rx.try_recv() {
            Ok(result) => Completion::Done(result),
            Err(TryRecvError::Empty) => Completion::Waiting,
            Err(TryRecvError::Disconnected) => Completion::Abandoned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_result_is_observed_once() {
        let mut p = Pending::resolved(5);
        assert!(matches!(p.poll(), Completion::Done(Ok(5))));
        assert!(matches!(p.poll(), Completion::Abandoned));
    }

    #[test]
    fn test_waiting_until_completed() {
        let (completer, mut p) = pending::<()>();
        assert!(matches!(p.poll(), Completion::Waiting));
        completer.reject(RemoteError::Rejected("nope".to_string()));
        match p.poll() {
            Completion::Done(Err(RemoteError::Rejected(msg))) => assert_eq!(msg, "nope"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dropped_completer_abandons() {
        let (completer, mut p) = pending::<u32>();
        drop(completer);
        assert!(matches!(p.poll(), Completion::Abandoned));
    }
}

/// Receiver of an operation's outcome.
///
/// Mutating provider operations have a callback form so they can be driven
/// from an async executor without blocking on the result. Any `FnOnce(T)`
/// closure can be used.
pub trait OperationComplete<T>: Send {
    fn on_complete(self: Box<Self>, result: T);
}

impl<T, F> OperationComplete<T> for F
where
    F: FnOnce(T) + Send,
{
    fn on_complete(self: Box<Self>, result: T) {
        (*self)(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_closure_receives_result() {
        let (tx, rx) = mpsc::channel();
        let callback: Box<dyn OperationComplete<u32>> = Box::new(move |n: u32| {
            tx.send(n).unwrap();
        });
        callback.on_complete(7);
        assert_eq!(rx.recv().unwrap(), 7);
    }
}

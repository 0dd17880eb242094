// bridge that lets background workers post messages to the ui.
//
// the subscription hands the application a sender once at startup;
// worker threads clone it and push messages that iced delivers to
// `update` on the ui thread, in order.

use crate::Message;
use iced::futures::channel::mpsc;
use iced::futures::{future, stream, Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Dispatcher(mpsc::UnboundedSender<Message>);

impl Dispatcher {
    pub fn send(&self, message: Message) {
        if let Err(e) = self.0.unbounded_send(message) {
            ::log::warn!("ui has gone away, dropping message: {:?}", e.into_inner());
        }
    }
}

//create stream that satisfies the needs of iced::Subscription::run
pub fn bridge() -> impl Stream<Item = Message> {
    let (input, messages) = mpsc::unbounded();
    stream::once(future::ready(Message::DispatcherReady(Dispatcher(input)))).chain(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced::futures::FutureExt;

    fn next_now<S: Stream<Item = Message> + Unpin>(s: &mut S) -> Option<Message> {
        s.next().now_or_never().flatten()
    }

    #[test]
    fn first_message_is_dispatcher() {
        let mut s = Box::pin(bridge());
        let dispatcher = match next_now(&mut s) {
            Some(Message::DispatcherReady(d)) => d,
            other => panic!("unexpected {:?}", other),
        };

        let worker = dispatcher.clone();
        std::thread::spawn(move || worker.send(Message::StopScan))
            .join()
            .unwrap();

        assert!(matches!(next_now(&mut s), Some(Message::StopScan)));
    }

    #[test]
    fn send_after_close_is_dropped() {
        let mut s = Box::pin(bridge());
        let dispatcher = match next_now(&mut s) {
            Some(Message::DispatcherReady(d)) => d,
            other => panic!("unexpected {:?}", other),
        };
        drop(s);
        dispatcher.send(Message::StopScan);
    }
}

use crate::domain::payment::Payment;
use crate::domain::ports::PaymentObserver;
use crate::error::{ErrorCategory, PaymentError};
use tokio::sync::mpsc;

/// A processing outcome, as delivered by [`ChannelObserver`].
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    Succeeded(Payment),
    Failed(Payment),
    Errored {
        payment: Payment,
        category: ErrorCategory,
        message: String,
    },
}

impl PaymentEvent {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Succeeded(payment) | Self::Failed(payment) => payment,
            Self::Errored { payment, .. } => payment,
        }
    }
}

/// Forwards observer callbacks into an unbounded tokio channel so the
/// application can consume them as a stream of [`PaymentEvent`]s.
#[derive(Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PaymentEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PaymentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: PaymentEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl PaymentObserver for ChannelObserver {
    fn on_success(&self, payment: &Payment) {
        self.send(PaymentEvent::Succeeded(payment.clone()));
    }

    fn on_failure(&self, payment: &Payment) {
        self.send(PaymentEvent::Failed(payment.clone()));
    }

    fn on_error(&self, payment: &Payment, error: &PaymentError) {
        self.send(PaymentEvent::Errored {
            payment: payment.clone(),
            category: error.category(),
            message: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_events_are_forwarded_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        let payment = Payment::new("1", dec!(1), "949");

        observer.on_success(&payment);
        observer.on_error(&payment, &PaymentError::Gateway("down".into()));

        assert!(matches!(rx.recv().await, Some(PaymentEvent::Succeeded(_))));
        match rx.recv().await {
            Some(PaymentEvent::Errored {
                category, message, ..
            }) => {
                assert_eq!(category, ErrorCategory::Gateway);
                assert_eq!(message, "Gateway error: down");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_failure(&Payment::new("1", dec!(1), "949"));
    }
}

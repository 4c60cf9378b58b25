//! The confirm-then-exit dialogue and the signal the server waits on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use chavruta_core::convo::{
    response_fn, Command, Dialogue, DialogueBuilder, DialogueError, Handler, QuestionOptions,
};

pub const CONFIRM_SHUTDOWN: &str = "confirmShutdown";

/// Fires once; every [`ShutdownListener`] observes it.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

#[derive(Clone, Debug)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> (Self, ShutdownListener) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender: Arc::new(sender) }, ShutdownListener { receiver })
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn trigger_after(&self, delay: Duration) {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(
                event_name = "bot.shutdown.triggered",
                delay_ms = delay.as_millis() as u64,
                "shutdown requested"
            );
            signal.trigger();
        });
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener { receiver: self.sender.subscribe() }
    }
}

impl ShutdownListener {
    /// Resolves once the signal has fired. Never resolves if every
    /// [`ShutdownSignal`] handle is gone without firing.
    pub async fn wait(&mut self) {
        if self.receiver.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn build_shutdown_dialogue(
    signal: ShutdownSignal,
    delay: Duration,
) -> Result<Dialogue, DialogueError> {
    let mut builder = DialogueBuilder::new();
    builder.add_question(
        "Are you sure you want me to shutdown?",
        vec![
            Handler::yes(response_fn(move |_, convo| {
                convo.say("Bye!");
                signal.trigger_after(delay);
                Ok(Command::Continue)
            })),
            Handler::no(response_fn(|_, convo| {
                convo.say("*Phew!*");
                Ok(Command::Continue)
            })),
            Handler::fallback(response_fn(|_, convo| {
                convo.say("*Phew!*");
                Ok(Command::Continue)
            })),
        ],
        QuestionOptions::default(),
        CONFIRM_SHUTDOWN,
    )?;
    Ok(builder.build())
}

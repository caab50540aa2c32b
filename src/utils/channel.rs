use tokio::sync::broadcast::{self, Sender};

use crate::session::events::SessionEvent;


const BUFFER_SIZE: usize = 50;
pub fn run() -> Sender<SessionEvent> {
    let (event_sender, _) = broadcast::channel(BUFFER_SIZE);
    event_sender
}

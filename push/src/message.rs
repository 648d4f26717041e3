use events::Event;
use log::*;

use crate::error::Error;

/// Decodes one inbound text frame.
pub fn decode(frame: &str) -> Result<Event, Error> {
    let event = Event::from_frame(frame)?;
    trace!("Decoded push event {}", event.id);
    Ok(event)
}

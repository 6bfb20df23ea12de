mod guard;
mod listener;
mod recorder;
mod stream;

pub use guard::ConnectionGuard;
pub use listener::{PeerAddr, TimedListener};
pub use recorder::Recorder as ConnectionRecorder;
pub use stream::TimedStream;

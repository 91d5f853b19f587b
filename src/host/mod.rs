//! Line-delimited JSON connection to the browser shim.

pub mod channel;
pub mod contract;
pub mod stdio;

pub use channel::{HostBrowser, host_channel};
pub use contract::{BrowserCommand, Inbound, Outbound, PROTOCOL_VERSION, Reply};
pub use stdio::{run_bridge, run_stdio_bridge};

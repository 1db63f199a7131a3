//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Protocol Format
//!
//! Raw JSON over a TCP byte stream. There is no length prefix and no
//! delimiter: a message ends when the bytes received so far parse as one
//! JSON value. Exactly one request and one response travel over each
//! connection; the server closes the socket after writing the response.
//!
//! ### Request
//! ```text
//! {"type": "<command-name>", "params": {...}}
//! ```
//!
//! ### Response
//! ```text
//! {"status": "success", "result": <any>}
//! {"status": "error", "message": "<string>"}
//! ```

mod command;
mod response;
mod codec;

pub use command::{Command, Params};
pub use response::{Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, write_response,
    FrameBuffer, READ_CHUNK_SIZE,
};

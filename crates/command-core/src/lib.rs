//! Command Handler (§4.3): executes `ModelCommand`s against the IMU Client
//! under the ownership rules in §3/§4.3. The `ModelCommand`/`ModelResult`
//! data model itself lives in `command-types`, re-exported here for
//! convenience.

mod handler;

pub use handler::CommandHandler;
pub use command_types::{
    CommandType, ImuCommandPayload, ImuControlStatus, ModelCommand, ModelResult,
};

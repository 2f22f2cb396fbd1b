pub mod bearer;
pub mod control;
pub mod dispatcher;
pub mod driver;
pub mod fragment;
pub mod oracle;
pub mod registry;
pub mod selector;
pub mod tracker;
pub mod transport;

pub use bearer::{BearerCodec, BearerEnvelope, BearerKind, BearerReassembler, CodecError};
pub use control::{ControlError, ControlLoopInfo, ControlLoops, MessageProducer};
pub use dispatcher::{
    AutoConfirm, Confirmer, DeliveryHandle, DeliveryRequest, TransmissionDispatcher,
};
pub use driver::{BearerDriver, ChannelDriver, DirectDriver, DriveResult, RelayDriver, Transmission};
pub use fragment::{split, Fragment, FragmentAssembler, FragmentError};
pub use oracle::{SystemEntry, SystemInfo, SystemOracle, SystemTable};
pub use registry::{ChannelRegistry, Route};
pub use selector::{discover_relay, Candidate, ChannelSelector, SelectError};
pub use tracker::{
    DeliveryListener, DeliveryOutcome, DeliveryStage, DeliveryTracker, DispatchInfo,
    SequenceListener,
};
pub use transport::{BearerSender, DirectSender, RelaySender, TransportError};

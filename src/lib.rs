pub mod coding_parameters;
pub mod constants;
pub mod error;
pub mod jpeg2000;

pub use coding_parameters::PacketCodingParameters;
pub use error::{ErrorKind, Tier2Error};
pub use jpeg2000::bit_io::{BitSink, HeaderBitReader};
pub use jpeg2000::image::{CodedCodeBlock, ComponentGeometry, ImageGeometry, SubbandOrientation};
pub use jpeg2000::packet::{EncodedPacket, EncoderSnapshot, PacketEncoder, SubbandContribution};
pub use jpeg2000::precinct::PrecinctGeometry;
pub use jpeg2000::progression::ProgressionOrder;
pub use jpeg2000::tag_tree::TagTreeEncoder;

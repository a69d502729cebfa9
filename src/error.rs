
use crate::LinkId;
use crate::link::LinkKind;
use crate::wifi::FrameError;

/// WiFi data link errors
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WifiError<E> {
    /// Link does not exist on this node
    InvalidLink(LinkId),

    /// Link exists but is not a wireless link
    NotWireless(LinkId, LinkKind),

    /// Frame encoding error
    Frame(FrameError),

    /// Wrapper for underlying physical layer errors
    Phy(E),
}

impl <E> From<FrameError> for WifiError<E> {
    fn from(e: FrameError) -> Self {
        WifiError::Frame(e)
    }
}

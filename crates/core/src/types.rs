/// User ids are opaque strings issued by the user service.
pub type UserId = String;

/// Correlation id carried by every operation envelope.
pub type RequestId = String;

use courier_retry::{FailureClass, Retryable};

/// Relay pipeline error variants.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("signature failure: {0}")]
    SignatureFailure(String),
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("publish rejected: {0}")]
    PublishRejected(String),
    #[error("endpoint unreachable: {0}")]
    EndpointUnreachable(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownMessageType(_) => "UNKNOWN_MESSAGE_TYPE",
            Self::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            Self::SignatureFailure(_) => "SIGNATURE_FAILURE",
            Self::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
            Self::PublishRejected(_) => "PUBLISH_REJECTED",
            Self::EndpointUnreachable(_) => "ENDPOINT_UNREACHABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl Retryable for RelayError {
    fn failure_class(&self) -> FailureClass {
        match self {
            // Connection-level trouble is expected to clear on retry.
            Self::BrokerUnavailable(_) | Self::EndpointUnreachable(_) | Self::Internal(_) => {
                FailureClass::Transient
            }
            // Bad data stays bad; retrying burns budget for nothing.
            Self::UnknownMessageType(_)
            | Self::MalformedPayload(_)
            | Self::SignatureFailure(_)
            | Self::PublishRejected(_) => FailureClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_connection_failures_as_transient() {
        assert!(RelayError::BrokerUnavailable("down".into()).is_transient());
        assert!(RelayError::EndpointUnreachable("refused".into()).is_transient());
        assert!(RelayError::Internal(anyhow::anyhow!("db gone")).is_transient());
    }

    #[test]
    fn should_classify_bad_data_as_permanent() {
        assert!(!RelayError::UnknownMessageType("ghost".into()).is_transient());
        assert!(!RelayError::MalformedPayload("not an object".into()).is_transient());
        assert!(!RelayError::SignatureFailure("empty key".into()).is_transient());
        assert!(!RelayError::PublishRejected("too large".into()).is_transient());
    }

    #[test]
    fn should_expose_stable_kinds() {
        assert_eq!(
            RelayError::UnknownMessageType("ghost".into()).kind(),
            "UNKNOWN_MESSAGE_TYPE"
        );
        assert_eq!(
            RelayError::BrokerUnavailable("down".into()).kind(),
            "BROKER_UNAVAILABLE"
        );
        assert_eq!(
            RelayError::Internal(anyhow::anyhow!("boom")).kind(),
            "INTERNAL"
        );
    }
}

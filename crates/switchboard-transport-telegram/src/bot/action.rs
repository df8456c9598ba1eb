//! Typed callback actions.
//!
//! Button payloads are decoded exactly once, here, into a closed enum; raw
//! tag strings never travel further than this module. An unknown tag and a
//! recognized tag with a broken parameter are told apart because the two are
//! handled differently (ignored vs. "no longer available").

/// A button press, decoded from its callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// User asks to be connected to the operator.
    Apply,
    /// User withdraws their pending request.
    CancelRequest,
    /// User leaves their active session.
    EndChat,
    /// Operator opens the pending-requests list.
    ViewPending,
    /// Operator opens the active-sessions list.
    ViewActive,
    /// Operator asked how to connect to a user directly.
    ConnectHint,
    /// Operator approves the request of the given user.
    Accept(i64),
    /// Operator turns down the request of the given user.
    Reject(i64),
    /// Operator ends the session of the given user.
    EndSession(i64),
}

/// Why a callback payload failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The tag is not one of ours; acknowledged and otherwise ignored.
    UnknownTag,
    /// A recognized tag carried a malformed parameter.
    BadParameter,
}

impl CallbackAction {
    /// Wire form of this action, used as the button's callback data.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Apply => "user_apply".to_string(),
            Self::CancelRequest => "user_cancel".to_string(),
            Self::EndChat => "user_end".to_string(),
            Self::ViewPending => "op_pending".to_string(),
            Self::ViewActive => "op_active".to_string(),
            Self::ConnectHint => "op_connect_hint".to_string(),
            Self::Accept(user) => format!("op_accept:{user}"),
            Self::Reject(user) => format!("op_reject:{user}"),
            Self::EndSession(user) => format!("op_end:{user}"),
        }
    }

    /// Decode a raw callback payload.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnknownTag`] for payloads that are not ours,
    /// [`DecodeError::BadParameter`] for recognized tags whose parameter does
    /// not parse.
    pub fn decode(data: &str) -> Result<Self, DecodeError> {
        match data {
            "user_apply" => return Ok(Self::Apply),
            "user_cancel" => return Ok(Self::CancelRequest),
            "user_end" => return Ok(Self::EndChat),
            "op_pending" => return Ok(Self::ViewPending),
            "op_active" => return Ok(Self::ViewActive),
            "op_connect_hint" => return Ok(Self::ConnectHint),
            _ => {}
        }
        let Some((tag, raw)) = data.split_once(':') else {
            return Err(DecodeError::UnknownTag);
        };
        let make: fn(i64) -> Self = match tag {
            "op_accept" => Self::Accept,
            "op_reject" => Self::Reject,
            "op_end" => Self::EndSession,
            _ => return Err(DecodeError::UnknownTag),
        };
        raw.parse::<i64>()
            .map(make)
            .map_err(|_| DecodeError::BadParameter)
    }

    /// Whether only the operator may perform this action.
    #[must_use]
    pub fn operator_only(&self) -> bool {
        !matches!(self, Self::Apply | Self::CancelRequest | Self::EndChat)
    }
}

use thiserror::Error;

/// Failures from [`crate::planner::Planner::buffer_line`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlannerError {
    #[error("planner ring buffer is full")]
    BufferFull,
    #[error("move has zero step length and was rejected")]
    EmptyBlock,
}

/// Failures from [`crate::arc::expand_arc`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ArcError {
    #[error("arc radius below minimum of 1 micron")]
    RadiusTooSmall,
    #[error("only the XY plane is currently supported for arcs")]
    UnsupportedPlane,
    #[error("planner rejected a chord: {0}")]
    Planner(PlannerError),
}

impl From<PlannerError> for ArcError {
    fn from(e: PlannerError) -> Self {
        ArcError::Planner(e)
    }
}

/// Failures from [`crate::settings::Settings::set_setting`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    #[error("setting id {0} is out of range")]
    UnknownId(u32),
    #[error("setting value must be finite and non-negative")]
    InvalidValue,
}

use super::PreparationState;

/// Combines two preparation states.
///
/// FAILED absorbs everything, unanimous SUCCEEDED or PENDING carries
/// through, and any other mixture is PREPARING.
pub fn combine(previous: Option<PreparationState>, current: PreparationState) -> PreparationState {
    use PreparationState::*;

    match (previous, current) {
        (None, current) => current,
        (Some(Failed), _) | (_, Failed) => Failed,
        (Some(Succeeded), Succeeded) => Succeeded,
        (Some(Pending), Pending) => Pending,
        _ => Preparing,
    }
}

/// Folds component states into one job state. No states reduce to PENDING.
pub fn reduce(states: impl IntoIterator<Item = PreparationState>) -> PreparationState {
    states
        .into_iter()
        .fold(None, |previous, current| Some(combine(previous, current)))
        .unwrap_or(PreparationState::Pending)
}

use crate::FanOutError;

/// Every operation's outcome, in submission order.
///
/// Produced by [`FanOut::settle`](crate::FanOut::settle) once all operations
/// have reached a terminal state. Use [`Settled::into_result`] to apply the
/// usual all-or-nothing policy, or inspect the individual outcomes when every
/// error matters.
#[derive(Debug)]
pub struct Settled<T, E> {
    outcomes: Vec<Result<T, E>>,
}

impl<T, E> Settled<T, E> {
    pub(crate) fn new(outcomes: Vec<Result<T, E>>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Result<T, E>> {
        self.outcomes.iter()
    }

    pub fn into_inner(self) -> Vec<Result<T, E>> {
        self.outcomes
    }

    /// The failure with the lowest index, regardless of when it happened.
    pub fn first_error(&self) -> Option<(usize, &E)> {
        self.errors().next()
    }

    /// All failures, ascending by index.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &E)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.as_ref().err().map(|err| (index, err)))
    }

    /// Collapses the outcomes into the ordered values, or the lowest-index error.
    pub fn into_result(self) -> Result<Vec<T>, FanOutError<E>> {
        let mut values = Vec::with_capacity(self.outcomes.len());

        for (index, outcome) in self.outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => values.push(value),
                Err(error) => return Err(FanOutError::OperationFailed { index, error }),
            }
        }

        Ok(values)
    }
}

impl<T, E> IntoIterator for Settled<T, E> {
    type Item = Result<T, E>;
    type IntoIter = std::vec::IntoIter<Result<T, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

impl<'a, T, E> IntoIterator for &'a Settled<T, E> {
    type Item = &'a Result<T, E>;
    type IntoIter = std::slice::Iter<'a, Result<T, E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

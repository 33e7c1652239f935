//! Wait-for-both-or-fail barrier for the parallel opening stage

use futures::future::{self, Either};
use std::future::Future;
use std::pin::pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Left,
    Right,
}

/// The first branch to fail, with its error
#[derive(Debug)]
pub struct JoinFailure<E> {
    pub branch: Branch,
    pub error: E,
}

/// Drive both futures concurrently. Resolves to both values only if both succeed;
/// the first failure is returned immediately and the other branch is dropped.
pub async fn join_both<A, B, E, FA, FB>(left: FA, right: FB) -> Result<(A, B), JoinFailure<E>>
where
    FA: Future<Output = Result<A, E>>,
    FB: Future<Output = Result<B, E>>,
{
    let left = pin!(left);
    let right = pin!(right);

    match future::select(left, right).await {
        Either::Left((Ok(a), right)) => match right.await {
            Ok(b) => Ok((a, b)),
            Err(error) => Err(JoinFailure {
                branch: Branch::Right,
                error,
            }),
        },
        Either::Left((Err(error), _)) => Err(JoinFailure {
            branch: Branch::Left,
            error,
        }),
        Either::Right((Ok(b), left)) => match left.await {
            Ok(a) => Ok((a, b)),
            Err(error) => Err(JoinFailure {
                branch: Branch::Left,
                error,
            }),
        },
        Either::Right((Err(error), _)) => Err(JoinFailure {
            branch: Branch::Right,
            error,
        }),
    }
}

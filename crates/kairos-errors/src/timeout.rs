use std::future::Future;
use std::time::Duration;

use crate::error::{KairosError, KairosResult};

/// Races `operation` against `deadline`, returning `TIMEOUT` on expiry.
pub async fn timeout<Fut, T>(deadline: Duration, operation: Fut) -> KairosResult<T>
where
    Fut: Future<Output = KairosResult<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(KairosError::timeout(format!(
            "operation exceeded deadline of {deadline:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_timeout_error_on_expiry() {
        let result: KairosResult<()> = timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn returns_value_when_within_deadline() {
        let result = timeout(Duration::from_millis(50), async { Ok::<_, KairosError>(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }
}

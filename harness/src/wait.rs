/*!

The convergence poller. A probe is sampled at a fixed interval until its value satisfies a
[`Condition`] or the [`ConvergenceWindow`] deadline passes.

The first sample is taken immediately. After each unsatisfied sample the poller sleeps for the
window's interval, clamped so that the final sample lands on the deadline. A window of timeout `T`
and interval `I` therefore samples at most `⌈T/I⌉ + 1` times. Errors returned by the probe end the
wait immediately and are returned unchanged.

!*/

use crate::error::{self, Result};
use hosted_model::{ConvergenceWindow, K8sVersion};
use log::info;
use std::fmt::Debug;
use std::future::Future;
use tokio::time::{sleep, Instant};

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A described predicate over an observed value. The description is used in logs and in the
/// timeout error.
pub struct Condition<T> {
    description: String,
    predicate: Predicate<T>,
}

impl<T> Debug for Condition<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .finish()
    }
}

impl<T> Condition<T> {
    /// An arbitrary predicate.
    pub fn satisfies<S, F>(description: S, predicate: F) -> Self
    where
        S: Into<String>,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_satisfied_by(&self, observed: &T) -> bool {
        (self.predicate)(observed)
    }
}

impl<T> Condition<T>
where
    T: PartialEq + Debug + Send + Sync + 'static,
{
    /// Exact equality.
    pub fn equals(expected: T) -> Self {
        Self {
            description: format!("equal to {:?}", expected),
            predicate: Box::new(move |observed| *observed == expected),
        }
    }
}

impl<I> Condition<Vec<I>>
where
    I: PartialEq + Debug + Send + Sync + 'static,
{
    /// Every expected item is present, in any order. Extra items are allowed.
    pub fn contains_all(expected: Vec<I>) -> Self {
        Self {
            description: format!("containing all of {:?}", expected),
            predicate: Box::new(move |observed| expected.iter().all(|e| observed.contains(e))),
        }
    }

    /// Exactly the expected items, in the same order.
    pub fn exact_elements(expected: Vec<I>) -> Self {
        Self {
            description: format!("exactly {:?}", expected),
            predicate: Box::new(move |observed| *observed == expected),
        }
    }
}

impl Condition<String> {
    /// The observed string parses as a Kubernetes version on the same or a later minor release
    /// than `minimum`. Unparseable values never satisfy the condition.
    pub fn at_least_version(minimum: &K8sVersion) -> Self {
        let minimum = minimum.clone();
        Self {
            description: format!("at least version {}", minimum.major_minor_without_v()),
            predicate: Box::new(move |observed| {
                K8sVersion::parse(observed)
                    .map(|v| v.at_least_minor(&minimum))
                    .unwrap_or(false)
            }),
        }
    }

    /// The observed string contains at least one of `needles`.
    pub fn contains_any<S: AsRef<str>>(needles: &[S]) -> Self {
        let needles: Vec<String> = needles.iter().map(|n| n.as_ref().to_string()).collect();
        Self {
            description: format!("containing one of {:?}", needles),
            predicate: Box::new(move |observed| needles.iter().any(|n| observed.contains(n))),
        }
    }
}

/// Samples `probe` until `condition` holds, returning the first satisfying value.
///
/// `awaited` names what is being waited for, e.g. `k8s upgrade to appear in the upstream spec`.
pub async fn poll_until<T, F, Fut>(
    awaited: &str,
    window: ConvergenceWindow,
    condition: &Condition<T>,
    mut probe: F,
) -> Result<T>
where
    T: Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let deadline = start + window.timeout();
    let mut sample = 0u64;
    loop {
        sample += 1;
        info!("Waiting for {} ({}), sample {}", awaited, condition.description, sample);
        let observed = probe().await?;
        if condition.is_satisfied_by(&observed) {
            return Ok(observed);
        }
        let now = Instant::now();
        if now >= deadline {
            return error::ConvergenceTimeoutSnafu {
                awaited,
                expected: condition.description.as_str(),
                last_observed: format!("{:?}", observed),
                elapsed: now.duration_since(start),
                window,
            }
            .fail();
        }
        sleep(window.interval().min(deadline - now)).await;
    }
}

/// Like [`poll_until`] for probes that answer yes or no.
pub async fn poll_until_true<F, Fut>(awaited: &str, window: ConvergenceWindow, probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    poll_until(awaited, window, &Condition::equals(true), probe).await?;
    Ok(())
}

//! Ordered symmetric difference of two sorted streams.

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::cancel::CancelToken;
use crate::error::SortError;
use crate::sorter::SortConfig;

/// Streaming symmetric-difference operator. Reads two channels that must
/// each already be sorted under `less` and emits, in order, every element
/// present on one side but not the other; elements matched pairwise by
/// `equal` are dropped from both sides.
pub struct Differ<T, L, E>
where
    L: Fn(&T, &T) -> bool,
    E: Fn(&T, &T) -> bool,
{
    left: Receiver<T>,
    right: Receiver<T>,
    less: L,
    equal: E,
    output: Sender<T>,
    errors: Sender<SortError>,
}

/// Creates a diff operator over two sorted input channels. The returned
/// triple follows the sorter contract: on setup failure the handle is
/// [`None`], the output channel is closed and the error channel already
/// holds the error.
pub fn new_diff<T, L, E>(
    left: Receiver<T>,
    right: Receiver<T>,
    less: L,
    equal: E,
    config: Option<SortConfig>,
) -> (Option<Differ<T, L, E>>, Receiver<T>, Receiver<SortError>)
where
    L: Fn(&T, &T) -> bool,
    E: Fn(&T, &T) -> bool,
{
    let config = config.unwrap_or_default();
    let (output_tx, output_rx) = bounded(config.sorted_chan_buffer);
    let (error_tx, error_rx) = bounded(1);

    if let Err(err) = config.validate() {
        error_tx.send(err).ok();
        return (None, output_rx, error_rx);
    }

    let differ = Differ {
        left,
        right,
        less,
        equal,
        output: output_tx,
        errors: error_tx,
    };

    (Some(differ), output_rx, error_rx)
}

impl<T, L, E> Differ<T, L, E>
where
    L: Fn(&T, &T) -> bool,
    E: Fn(&T, &T) -> bool,
{
    /// Drives the diff to completion. The output channel closes when the
    /// diff ends; cancellation surfaces as [`SortError::Canceled`] on the
    /// error channel.
    pub fn run(self, cancel: &CancelToken) {
        let Differ {
            left,
            right,
            less,
            equal,
            output,
            errors,
        } = self;

        match run_diff(left, right, &less, &equal, &output, cancel) {
            Ok(emitted) => log::debug!("diff finished, {} elements emitted", emitted),
            Err(err) => {
                log::debug!("diff failed: {}", err);
                if errors.try_send(err).is_err() {
                    log::warn!("diff error not delivered, error channel abandoned");
                }
            }
        }
    }
}

fn run_diff<T, L, E>(
    left: Receiver<T>,
    right: Receiver<T>,
    less: &L,
    equal: &E,
    output: &Sender<T>,
    cancel: &CancelToken,
) -> Result<u64, SortError>
where
    L: Fn(&T, &T) -> bool,
    E: Fn(&T, &T) -> bool,
{
    let mut emitted = 0u64;
    let mut l = next_item(&left, cancel)?;
    let mut r = next_item(&right, cancel)?;

    loop {
        if cancel.is_canceled() {
            return Err(SortError::Canceled);
        }

        match (l, r) {
            (None, None) => return Ok(emitted),
            (Some(a), None) => {
                emit(output, a, cancel)?;
                emitted += 1;
                l = next_item(&left, cancel)?;
                r = None;
            }
            (None, Some(b)) => {
                emit(output, b, cancel)?;
                emitted += 1;
                l = None;
                r = next_item(&right, cancel)?;
            }
            (Some(a), Some(b)) => {
                if equal(&a, &b) {
                    l = next_item(&left, cancel)?;
                    r = next_item(&right, cancel)?;
                } else if less(&a, &b) {
                    emit(output, a, cancel)?;
                    emitted += 1;
                    l = next_item(&left, cancel)?;
                    r = Some(b);
                } else {
                    emit(output, b, cancel)?;
                    emitted += 1;
                    l = Some(a);
                    r = next_item(&right, cancel)?;
                }
            }
        }
    }
}

fn next_item<T>(rx: &Receiver<T>, cancel: &CancelToken) -> Result<Option<T>, SortError> {
    select! {
        recv(rx) -> msg => Ok(msg.ok()),
        recv(cancel.signal()) -> _ => Err(SortError::Canceled),
    }
}

fn emit<T>(tx: &Sender<T>, item: T, cancel: &CancelToken) -> Result<(), SortError> {
    select! {
        send(tx, item) -> res => res.map_err(|_| SortError::Canceled),
        recv(cancel.signal()) -> _ => Err(SortError::Canceled),
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use crossbeam_channel::bounded;
    use rstest::*;

    use super::new_diff;
    use crate::cancel::CancelToken;
    use crate::error::SortError;
    use crate::sorter::SortConfig;

    fn int_less(a: &i32, b: &i32) -> bool {
        a < b
    }

    fn int_equal(a: &i32, b: &i32) -> bool {
        a == b
    }

    fn run_diff_case(left: Vec<i32>, right: Vec<i32>) -> (Vec<i32>, Vec<SortError>) {
        let (left_tx, left_rx) = bounded(left.len().max(1));
        for item in left {
            left_tx.send(item).unwrap();
        }
        drop(left_tx);

        let (right_tx, right_rx) = bounded(right.len().max(1));
        for item in right {
            right_tx.send(item).unwrap();
        }
        drop(right_tx);

        let (differ, output_rx, error_rx) = new_diff(left_rx, right_rx, int_less, int_equal, None);
        let differ = differ.expect("differ construction failed");
        let cancel = CancelToken::new();

        let mut collected = Vec::new();
        thread::scope(|scope| {
            let cancel = &cancel;
            scope.spawn(move || differ.run(cancel));
            for item in output_rx.iter() {
                collected.push(item);
            }
        });

        (collected, Vec::from_iter(error_rx.try_iter()))
    }

    #[rstest]
    #[case(vec![1, 3, 5, 7], vec![2, 3, 6, 7], vec![1, 2, 5, 6])]
    #[case(vec![], vec![], vec![])]
    #[case(vec![1, 2, 3], vec![], vec![1, 2, 3])]
    #[case(vec![], vec![4, 5], vec![4, 5])]
    #[case(vec![1, 2, 3], vec![1, 2, 3], vec![])]
    #[case(vec![1, 1, 2], vec![1], vec![1, 2])]
    fn test_diff(#[case] left: Vec<i32>, #[case] right: Vec<i32>, #[case] expected: Vec<i32>) {
        let (result, errors) = run_diff_case(left, right);
        assert_eq!(result, expected);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_diff_canceled() {
        let (left_tx, left_rx) = bounded::<i32>(4);
        let (right_tx, right_rx) = bounded::<i32>(4);
        left_tx.send(1).unwrap();
        right_tx.send(2).unwrap();
        drop(left_tx);
        drop(right_tx);

        let (differ, output_rx, error_rx) = new_diff(left_rx, right_rx, int_less, int_equal, None);
        let differ = differ.unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut collected = Vec::new();
        thread::scope(|scope| {
            let cancel = &cancel;
            scope.spawn(move || differ.run(cancel));
            for item in output_rx.iter() {
                collected.push(item);
            }
        });

        assert!(collected.is_empty());
        let errors = Vec::from_iter(error_rx.try_iter());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], SortError::Canceled));
    }

    #[test]
    fn test_diff_rejects_invalid_config() {
        let (_left_tx, left_rx) = bounded::<i32>(1);
        let (_right_tx, right_rx) = bounded::<i32>(1);

        let config = SortConfig::new().with_num_workers(0);
        let (differ, output_rx, error_rx) =
            new_diff(left_rx, right_rx, int_less, int_equal, Some(config));

        assert!(differ.is_none());
        assert_eq!(output_rx.iter().count(), 0);

        let errors = Vec::from_iter(error_rx.try_iter());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], SortError::InvalidConfig(_)));
    }
}

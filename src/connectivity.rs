//! Network reachability tracking
//!
//! Raw reachability signals arrive on a channel, possibly repeated and from
//! any thread. [`ConnectivityMonitor`] debounces them into state-class
//! transitions and tells its listener to pause or resume polling exactly once
//! per transition.

use std::time::Duration;

use compact_str::CompactString;
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    dispatcher::{Dispatcher, EventBus},
    event::HubbyEvent,
};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ConnectivityState {
    Unreachable,
    ReachableViaWifi,
    ReachableViaCellular,
}

impl ConnectivityState {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ConnectivityState::Unreachable)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Transition {
    Lost,
    Restored,
}

/// Receives pause/resume decisions
pub trait ConnectivityListener {
    fn connectivity_lost(&self);
    fn connectivity_restored(&self);
}

/// Result of feeding one raw signal to the monitor
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Observation {
    /// The concrete state differs from the previous signal
    pub changed: bool,
    /// Reachability class flipped
    pub transition: Option<Transition>,
}

/// Two-state machine {Unreachable, Reachable}; assumes Reachable at start
#[derive(Debug)]
pub struct ConnectivityMonitor {
    last: Option<ConnectivityState>,
    reachable: bool,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self { last: None, reachable: true }
    }

    pub fn state(&self) -> Option<ConnectivityState> {
        self.last
    }

    pub fn observe(&mut self, signal: ConnectivityState) -> Observation {
        let changed = self.last != Some(signal);
        self.last = Some(signal);

        let transition = match (self.reachable, signal.is_reachable()) {
            (true, false) => Some(Transition::Lost),
            (false, true) => Some(Transition::Restored),
            _ => None,
        };
        self.reachable = signal.is_reachable();

        Observation { changed, transition }
    }

    /// Consume raw signals until every sender is gone
    #[instrument(skip_all)]
    pub async fn run<L>(
        mut self,
        mut signals: mpsc::Receiver<ConnectivityState>,
        listener: L,
        events: EventBus,
    ) where
        L: ConnectivityListener,
    {
        debug!("Starting connectivity monitor");

        while let Some(signal) = signals.recv().await {
            let observation = self.observe(signal);

            if observation.changed {
                events.dispatch(HubbyEvent::ConnectivityChanged(signal));
            }

            match observation.transition {
                Some(Transition::Lost) => {
                    warn!(state = ?signal, "Network unreachable, pausing polling");
                    listener.connectivity_lost();
                },
                Some(Transition::Restored) => {
                    info!(state = ?signal, "Network reachable again, resuming polling");
                    listener.connectivity_restored();
                },
                None => {},
            }
        }

        debug!("Connectivity monitor ended");
    }
}

/// Produces raw reachability signals by connecting to a TCP endpoint
///
/// A TCP probe cannot tell interfaces apart; a successful connect reports
/// [`ConnectivityState::ReachableViaWifi`].
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    /// `host:port`
    pub target: CompactString,
    pub interval: Duration,
    pub timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(target: impl Into<CompactString>, interval: Duration) -> Self {
        Self {
            target: target.into(),
            interval,
            timeout: Duration::from_secs(5),
        }
    }

    pub async fn probe(&self) -> ConnectivityState {
        match timeout(self.timeout, TcpStream::connect(self.target.as_str())).await {
            Ok(Ok(_)) => ConnectivityState::ReachableViaWifi,
            Ok(Err(e)) => {
                debug!(target = %self.target, error = %e, "Reachability probe failed");
                ConnectivityState::Unreachable
            },
            Err(_) => {
                debug!(target = %self.target, "Reachability probe timed out");
                ConnectivityState::Unreachable
            },
        }
    }

    /// Probe forever, stopping once the receiving side is dropped
    pub fn spawn(self, signals: mpsc::Sender<ConnectivityState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let state = self.probe().await;
                if signals.send(state).await.is_err() {
                    break;
                }
                sleep(self.interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    use super::ConnectivityState::*;

    #[derive(Default, Clone)]
    struct CountingListener {
        lost: Arc<AtomicUsize>,
        restored: Arc<AtomicUsize>,
    }

    impl ConnectivityListener for CountingListener {
        fn connectivity_lost(&self) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }

        fn connectivity_restored(&self) {
            self.restored.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn repeated_signals_are_debounced() {
        let mut monitor = ConnectivityMonitor::new();

        assert_eq!(monitor.observe(ReachableViaWifi).transition, None);
        assert_eq!(monitor.observe(Unreachable).transition, Some(Transition::Lost));
        assert_eq!(
            monitor.observe(Unreachable),
            Observation { changed: false, transition: None }
        );
        assert_eq!(monitor.observe(ReachableViaCellular).transition, Some(Transition::Restored));
    }

    #[test]
    fn interface_switch_is_not_a_class_change() {
        let mut monitor = ConnectivityMonitor::new();
        monitor.observe(ReachableViaWifi);

        let observation = monitor.observe(ReachableViaCellular);

        assert!(observation.changed);
        assert_eq!(observation.transition, None);
        assert_eq!(monitor.state(), Some(ReachableViaCellular));
    }

    #[test]
    fn unreachable_first_signal_pauses() {
        let mut monitor = ConnectivityMonitor::new();
        assert_eq!(monitor.observe(Unreachable).transition, Some(Transition::Lost));
    }

    #[tokio::test]
    async fn listener_called_once_per_class_change() {
        let (tx, rx) = mpsc::channel(16);
        let listener = CountingListener::default();
        let events = EventBus::default();
        let mut sub = events.subscribe();

        for s in [ReachableViaWifi, Unreachable, Unreachable, Unreachable, ReachableViaWifi, ReachableViaCellular, ReachableViaCellular] {
            tx.send(s).await.unwrap();
        }
        drop(tx);

        ConnectivityMonitor::new()
            .run(rx, listener.clone(), events)
            .await;

        assert_eq!(listener.lost.load(Ordering::SeqCst), 1);
        assert_eq!(listener.restored.load(Ordering::SeqCst), 1);

        let mut published = Vec::new();
        while let Ok(HubbyEvent::ConnectivityChanged(state)) = sub.try_recv() {
            published.push(state);
        }
        assert_eq!(published, vec![ReachableViaWifi, Unreachable, ReachableViaWifi, ReachableViaCellular]);
    }

    #[tokio::test]
    async fn probe_reports_unreachable_for_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = ReachabilityProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(probe.probe().await.is_reachable());

        drop(listener);
        assert_eq!(probe.probe().await, Unreachable);
    }
}

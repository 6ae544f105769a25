//! Integration tests for the report-generation follower.
//!
//! A four-oracle committee with one tolerated fault (n = 4, f = 1) runs the
//! follower as oracle 2, with oracle 1 as the epoch's leader. Messages are
//! driven directly through the dispatcher; outbound traffic and events are
//! captured by mocks.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use num_bigint::BigInt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use oraclecore_config::{PublicConfig, SharedConfig};
use oraclecore_core::{
    ConfigDigest, ContractError, ContractResult, ContractTransmitter, DataSource, DataSourceError,
    LocalConfig, OracleId, OracleIdentity, PrivateKeys, TransmissionDetails,
};
use oraclecore_crypto::{Address, OffchainKeypair, OffchainPublicKey, OnchainKeypair};
use oraclecore_protocol::{
    AttestedReport, AttributedObservation, AttributedSignedObservation, Message,
    Observation, PacemakerEvent, ReportContext, ReportGenerationFollower, SignedObservation,
    TelemetrySender, TransmitEvent,
};

const EPOCH: u32 = 1;
const LEADER: OracleId = 1; // epoch 1 mod n 4
const US: OracleId = 2;
const N: usize = 4;
const F: usize = 1;

struct TestKeys {
    onchain: OnchainKeypair,
    offchain: OffchainKeypair,
}

impl TestKeys {
    fn random() -> Self {
        Self {
            onchain: OnchainKeypair::random(),
            offchain: OffchainKeypair::random(),
        }
    }
}

impl PrivateKeys for TestKeys {
    fn sign_offchain(
        &self,
        msg: &[u8],
    ) -> Result<oraclecore_crypto::OffchainSignature, oraclecore_crypto::CryptoError> {
        Ok(self.offchain.sign(msg))
    }

    fn sign_onchain(
        &self,
        msg: &[u8],
    ) -> Result<oraclecore_crypto::ReportSignature, oraclecore_crypto::CryptoError> {
        self.onchain.sign(msg)
    }

    fn public_key_offchain(&self) -> OffchainPublicKey {
        self.offchain.public_key()
    }

    fn onchain_address(&self) -> Address {
        self.onchain.address()
    }
}

struct MockDataSource {
    value: Mutex<Option<i64>>,
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn observe(&self) -> Result<BigInt, DataSourceError> {
        match *self.value.lock() {
            Some(v) => Ok(BigInt::from(v)),
            None => Err(DataSourceError("api down".to_string())),
        }
    }
}

struct MockTransmitter {
    details: Mutex<Option<TransmissionDetails>>,
}

#[async_trait]
impl ContractTransmitter for MockTransmitter {
    async fn latest_transmission_details(&self) -> ContractResult<TransmissionDetails> {
        self.details
            .lock()
            .clone()
            .ok_or_else(|| ContractError::Client("node unreachable".to_string()))
    }

    fn from_address(&self) -> Address {
        [0xFF; 20]
    }
}

#[derive(Default)]
struct RecordingNet {
    sent: Mutex<Vec<(Message, Option<OracleId>)>>,
}

#[async_trait]
impl oraclecore_protocol::NetSender for RecordingNet {
    async fn send_to(&self, msg: Message, to: OracleId) {
        self.sent.lock().push((msg, Some(to)));
    }

    async fn broadcast(&self, msg: Message) {
        self.sent.lock().push((msg, None));
    }
}

impl RecordingNet {
    fn take(&self) -> Vec<(Message, Option<OracleId>)> {
        std::mem::take(&mut self.sent.lock())
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    rounds: Mutex<Vec<(u32, u8, OracleId)>>,
}

impl TelemetrySender for RecordingTelemetry {
    fn round_started(&self, _digest: ConfigDigest, epoch: u32, round: u8, leader: OracleId) {
        self.rounds.lock().push((epoch, round, leader));
    }
}

struct Harness {
    follower: ReportGenerationFollower,
    keys: Vec<Arc<TestKeys>>,
    config: Arc<SharedConfig>,
    net: Arc<RecordingNet>,
    telemetry: Arc<RecordingTelemetry>,
    datasource: Arc<MockDataSource>,
    transmitter: Arc<MockTransmitter>,
    pacemaker_rx: mpsc::Receiver<PacemakerEvent>,
    transmit_rx: mpsc::Receiver<TransmitEvent>,
    _shutdown: broadcast::Sender<()>,
}

fn harness() -> Harness {
    harness_at_epoch(EPOCH)
}

fn harness_at_epoch(epoch: u32) -> Harness {
    let keys: Vec<Arc<TestKeys>> = (0..N).map(|_| Arc::new(TestKeys::random())).collect();
    let oracle_identities: Vec<OracleIdentity> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| OracleIdentity {
            peer_id: format!("peer-{i}"),
            onchain_signing_address: k.onchain_address(),
            offchain_public_key: k.public_key_offchain(),
            transmit_address: [i as u8 + 1; 20],
        })
        .collect();
    let config = Arc::new(SharedConfig {
        public: PublicConfig {
            config_digest: ConfigDigest([0xAA; 16]),
            oracle_identities,
            f: F,
            r_max: 10,
            alpha_ppb: 1_000_000, // 0.1%
            delta_resend: Duration::from_secs(1),
            delta_progress: Duration::from_secs(10),
            delta_round: Duration::from_secs(5),
            delta_c: Duration::from_secs(3600),
        },
        shared_secret: [0; 32],
    });

    let datasource = Arc::new(MockDataSource {
        value: Mutex::new(Some(100)),
    });
    // Default: initial round, nothing ever transmitted
    let transmitter = Arc::new(MockTransmitter {
        details: Mutex::new(Some(TransmissionDetails {
            config_digest: config.public.config_digest,
            epoch: 0,
            round: 0,
            latest_answer: BigInt::from(0),
            latest_timestamp: SystemTime::now(),
        })),
    });
    let net = Arc::new(RecordingNet::default());
    let telemetry = Arc::new(RecordingTelemetry::default());

    let (_inbound_tx, inbound_rx) = mpsc::channel(8);
    let (pacemaker_tx, pacemaker_rx) = mpsc::channel(8);
    let (transmit_tx, transmit_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let follower = ReportGenerationFollower::new(
        Arc::clone(&config),
        US,
        epoch,
        LocalConfig::default(),
        Arc::clone(&datasource) as Arc<dyn DataSource>,
        Arc::clone(&transmitter) as Arc<dyn ContractTransmitter>,
        Arc::clone(&keys[US as usize]) as Arc<dyn PrivateKeys>,
        Arc::clone(&net) as Arc<dyn oraclecore_protocol::NetSender>,
        Arc::clone(&telemetry) as Arc<dyn TelemetrySender>,
        inbound_rx,
        pacemaker_tx,
        transmit_tx,
        shutdown_rx,
    );

    Harness {
        follower,
        keys,
        config,
        net,
        telemetry,
        datasource,
        transmitter,
        pacemaker_rx,
        transmit_rx,
        _shutdown: shutdown_tx,
    }
}

impl Harness {
    fn context(&self, round: u8) -> ReportContext {
        ReportContext {
            config_digest: self.config.public.config_digest,
            epoch: EPOCH,
            round,
        }
    }

    fn signed_observations(
        &self,
        round: u8,
        entries: &[(OracleId, i64)],
    ) -> Vec<AttributedSignedObservation> {
        let context = self.context(round);
        entries
            .iter()
            .map(|&(observer, value)| {
                let observation = Observation::new(BigInt::from(value)).unwrap();
                let signed = SignedObservation::sign(
                    observation,
                    &context,
                    &*self.keys[observer as usize],
                )
                .unwrap();
                AttributedSignedObservation {
                    signed_observation: signed,
                    observer,
                }
            })
            .collect()
    }

    fn attested_report(
        &self,
        round: u8,
        entries: &[(OracleId, i64)],
        signers: &[OracleId],
    ) -> AttestedReport {
        let context = self.context(round);
        let observations: Vec<AttributedObservation> = entries
            .iter()
            .map(|&(observer, value)| AttributedObservation {
                observation: Observation::new(BigInt::from(value)).unwrap(),
                observer,
            })
            .collect();
        let mut report = AttestedReport::sign_as(
            observations.clone(),
            &context,
            &*self.keys[signers[0] as usize],
        )
        .unwrap();
        for signer in &signers[1..] {
            let extra = AttestedReport::sign_as(
                observations.clone(),
                &context,
                &*self.keys[*signer as usize],
            )
            .unwrap();
            report.signatures.extend(extra.signatures);
        }
        report
    }

    /// Run the follower through observe-req so it sits in `round`.
    async fn advance_to_round(&mut self, round: u8) {
        self.follower
            .handle_message(Message::ObserveReq { epoch: EPOCH, round }, LEADER)
            .await;
        assert_eq!(self.follower.state().r, round);
        self.net.take();
    }

    /// Non-initial transmission details so `should_report` is driven by
    /// deviation/heartbeat alone.
    fn set_transmission(&self, answer: i64, age: Duration) {
        *self.transmitter.details.lock() = Some(TransmissionDetails {
            config_digest: self.config.public.config_digest,
            epoch: 5,
            round: 2,
            latest_answer: BigInt::from(answer),
            latest_timestamp: SystemTime::now() - age,
        });
    }
}

// --- S1: happy path ------------------------------------------------------

#[tokio::test]
async fn happy_path_emits_one_transmit() {
    let mut h = harness();

    // Leader opens round 1; we reply with a signed observation
    h.follower
        .handle_message(Message::ObserveReq { epoch: EPOCH, round: 1 }, LEADER)
        .await;
    let sent = h.net.take();
    assert_eq!(sent.len(), 1);
    let (Message::Observe { epoch, round, signed_observation }, Some(to)) = &sent[0] else {
        panic!("expected an observe message, got {sent:?}");
    };
    assert_eq!((*epoch, *round, *to), (EPOCH, 1, LEADER));
    assert_eq!(
        signed_observation.observation.value(),
        Some(&BigInt::from(100))
    );
    assert_eq!(h.telemetry.rounds.lock().as_slice(), &[(EPOCH, 1, LEADER)]);

    // Leader proposes a report with 3 distinct observations (> 2f)
    let observations = h.signed_observations(1, &[(0, 100), (2, 100), (3, 101)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    let sent = h.net.take();
    assert_eq!(sent.len(), 1);
    let (Message::Report { report, .. }, Some(to)) = &sent[0] else {
        panic!("expected a report message, got {sent:?}");
    };
    assert_eq!(*to, LEADER);
    assert_eq!(report.signatures.len(), 1);
    assert!(h.follower.state().sent_report);

    // Leader finalizes with 2 signatures (> f); we echo
    let entries = [(0, 100), (2, 100), (3, 101)];
    let attested = h.attested_report(1, &entries, &[1, 0]);
    h.follower
        .handle_message(
            Message::Final { epoch: EPOCH, round: 1, report: attested.clone() },
            LEADER,
        )
        .await;
    let sent = h.net.take();
    assert!(matches!(&sent[..], [(Message::FinalEcho { .. }, None)]));
    assert!(h.follower.state().sent_echo.is_some());

    // First echo: not enough yet
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: attested.clone() },
            0,
        )
        .await;
    assert!(h.transmit_rx.try_recv().is_err());

    // Second echo crosses f: exactly one transmit, round complete
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: attested.clone() },
            3,
        )
        .await;
    let transmit = h.transmit_rx.try_recv().expect("expected a transmit event");
    assert_eq!((transmit.epoch, transmit.round), (EPOCH, 1));
    assert_eq!(transmit.report, attested);
    assert!(h.transmit_rx.try_recv().is_err());
    assert!(h.follower.state().completed_round);
    assert!(matches!(
        h.pacemaker_rx.try_recv(),
        Ok(PacemakerEvent::Progress)
    ));
}

// --- S2: wrong epoch ------------------------------------------------------

#[tokio::test]
async fn report_request_from_wrong_epoch_is_dropped() {
    let mut h = harness_at_epoch(2);
    let observations = h.signed_observations(1, &[(0, 100), (2, 100), (3, 101)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: 1, round: 1, observations },
            2, // leader of epoch 2
        )
        .await;
    assert!(h.net.take().is_empty());
    assert!(!h.follower.state().sent_report);
    assert_eq!(h.follower.state().r, 0);
}

// --- S3: out-of-bounds round ---------------------------------------------

#[tokio::test]
async fn observe_request_past_rmax_plus_one_is_dropped() {
    let mut h = harness();
    h.follower
        .handle_message(Message::ObserveReq { epoch: EPOCH, round: 12 }, LEADER)
        .await;
    assert_eq!(h.follower.state().r, 0);
    assert!(h.net.take().is_empty());
    assert!(h.pacemaker_rx.try_recv().is_err());
}

// --- S4: leader expired ---------------------------------------------------

#[tokio::test]
async fn observe_request_at_rmax_plus_one_changes_leader() {
    let mut h = harness();
    h.follower
        .handle_message(Message::ObserveReq { epoch: EPOCH, round: 11 }, LEADER)
        .await;
    assert_eq!(h.follower.state().r, 11);
    assert!(matches!(
        h.pacemaker_rx.try_recv(),
        Ok(PacemakerEvent::ChangeLeader)
    ));
    assert!(h.net.take().is_empty());
}

// --- S5: insufficient observations ---------------------------------------

#[tokio::test]
async fn report_request_with_2f_observations_is_rejected() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let observations = h.signed_observations(1, &[(0, 100), (3, 101)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    assert!(h.net.take().is_empty());
    assert!(!h.follower.state().sent_report);
}

// --- S6: duplicate echo ---------------------------------------------------

#[tokio::test]
async fn duplicate_final_echo_counts_once() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let report = h.attested_report(1, &[(0, 100), (2, 100), (3, 101)], &[1, 0]);
    for _ in 0..2 {
        h.follower
            .handle_message(
                Message::FinalEcho { epoch: EPOCH, round: 1, report: report.clone() },
                3,
            )
            .await;
    }
    assert_eq!(h.follower.state().echo_count(), 1);
    assert!(h.transmit_rx.try_recv().is_err());
    assert!(!h.follower.state().completed_round);
}

// --- S7/S8/S9: shouldReport policy ---------------------------------------

#[tokio::test]
async fn deviation_triggers_report() {
    let mut h = harness();
    h.advance_to_round(1).await;
    // On-chain answer 100, median 110: 10% deviation against a 0.1% bound
    h.set_transmission(100, Duration::ZERO);
    let observations = h.signed_observations(1, &[(0, 109), (2, 110), (3, 111)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    let sent = h.net.take();
    assert!(matches!(&sent[..], [(Message::Report { .. }, Some(LEADER))]));
}

#[tokio::test]
async fn no_deviation_no_heartbeat_skips_report() {
    let mut h = harness();
    h.advance_to_round(1).await;
    // Fresh answer identical to the median: nothing to report
    h.set_transmission(100, Duration::ZERO);
    let observations = h.signed_observations(1, &[(0, 100), (2, 100), (3, 100)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    assert!(h.net.take().is_empty());
    assert!(!h.follower.state().sent_report);
    assert!(h.follower.state().completed_round);
    assert!(matches!(
        h.pacemaker_rx.try_recv(),
        Ok(PacemakerEvent::Progress)
    ));
}

#[tokio::test]
async fn stale_answer_triggers_heartbeat_report() {
    let mut h = harness();
    h.advance_to_round(1).await;
    // Same value as on-chain, but the answer is older than delta_c
    let age = h.config.public.delta_c + Duration::from_secs(10);
    h.set_transmission(100, age);
    let observations = h.signed_observations(1, &[(0, 100), (2, 100), (3, 100)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    let sent = h.net.take();
    assert!(matches!(&sent[..], [(Message::Report { .. }, Some(LEADER))]));
}

#[tokio::test]
async fn unreachable_contract_errs_toward_reporting() {
    let mut h = harness();
    h.advance_to_round(1).await;
    *h.transmitter.details.lock() = None;
    let observations = h.signed_observations(1, &[(0, 100), (2, 100), (3, 101)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    let sent = h.net.take();
    assert!(matches!(&sent[..], [(Message::Report { .. }, Some(LEADER))]));
}

// --- guard discipline -----------------------------------------------------

#[tokio::test]
async fn round_number_never_decreases() {
    let mut h = harness();
    h.advance_to_round(3).await;
    h.follower
        .handle_message(Message::ObserveReq { epoch: EPOCH, round: 2 }, LEADER)
        .await;
    assert_eq!(h.follower.state().r, 3);
    assert!(h.net.take().is_empty());
}

#[tokio::test]
async fn observe_request_from_non_leader_is_dropped() {
    let mut h = harness();
    h.follower
        .handle_message(Message::ObserveReq { epoch: EPOCH, round: 1 }, 3)
        .await;
    assert_eq!(h.follower.state().r, 0);
    assert!(h.net.take().is_empty());
}

#[tokio::test]
async fn final_from_non_leader_is_dropped() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let report = h.attested_report(1, &[(0, 100), (2, 100), (3, 101)], &[1, 0]);
    h.follower
        .handle_message(Message::Final { epoch: EPOCH, round: 1, report }, 0)
        .await;
    assert!(h.follower.state().sent_echo.is_none());
    assert!(h.net.take().is_empty());
}

#[tokio::test]
async fn final_with_f_signatures_is_rejected() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let report = h.attested_report(1, &[(0, 100), (2, 100), (3, 101)], &[1]);
    h.follower
        .handle_message(Message::Final { epoch: EPOCH, round: 1, report }, LEADER)
        .await;
    assert!(h.follower.state().sent_echo.is_none());
    assert!(h.net.take().is_empty());
}

#[tokio::test]
async fn unsorted_report_request_is_rejected() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let observations = h.signed_observations(1, &[(0, 101), (2, 100), (3, 100)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    assert!(h.net.take().is_empty());
    assert!(!h.follower.state().sent_report);
}

#[tokio::test]
async fn duplicate_observer_in_report_request_is_rejected() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let observations = h.signed_observations(1, &[(0, 100), (0, 100), (3, 101)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    assert!(h.net.take().is_empty());
    assert!(!h.follower.state().sent_report);
}

#[tokio::test]
async fn echo_adopted_and_rebroadcast_when_final_was_missed() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let report = h.attested_report(1, &[(0, 100), (2, 100), (3, 101)], &[1, 0]);

    // We never saw the leader's Final, only a peer's echo
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: report.clone() },
            0,
        )
        .await;
    let sent = h.net.take();
    assert!(matches!(&sent[..], [(Message::FinalEcho { .. }, None)]));
    assert_eq!(h.follower.state().sent_echo.as_ref(), Some(&report));
}

#[tokio::test]
async fn completed_round_drops_further_traffic() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let report = h.attested_report(1, &[(0, 100), (2, 100), (3, 101)], &[1, 0]);
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: report.clone() },
            0,
        )
        .await;
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: report.clone() },
            3,
        )
        .await;
    assert!(h.follower.state().completed_round);
    let _ = h.transmit_rx.try_recv().unwrap();
    h.net.take();

    // A late echo and a late report request change nothing
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: report.clone() },
            1,
        )
        .await;
    let observations = h.signed_observations(1, &[(0, 100), (2, 100), (3, 101)]);
    h.follower
        .handle_message(
            Message::ReportReq { epoch: EPOCH, round: 1, observations },
            LEADER,
        )
        .await;
    assert!(h.transmit_rx.try_recv().is_err());
    assert!(h.net.take().is_empty());
    assert_eq!(h.follower.state().echo_count(), 2);
}

#[tokio::test]
async fn missing_observation_sits_round_out() {
    let mut h = harness();
    *h.datasource.value.lock() = None;
    h.follower
        .handle_message(Message::ObserveReq { epoch: EPOCH, round: 1 }, LEADER)
        .await;
    // Round state advanced, but nothing was signed or sent
    assert_eq!(h.follower.state().r, 1);
    assert!(h.net.take().is_empty());
}

#[tokio::test]
async fn new_round_resets_per_round_state() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let report = h.attested_report(1, &[(0, 100), (2, 100), (3, 101)], &[1, 0]);
    h.follower
        .handle_message(
            Message::FinalEcho { epoch: EPOCH, round: 1, report: report.clone() },
            0,
        )
        .await;
    assert_eq!(h.follower.state().echo_count(), 1);
    assert!(h.follower.state().sent_echo.is_some());

    h.advance_to_round(2).await;
    let state = h.follower.state();
    assert_eq!(state.echo_count(), 0);
    assert!(state.sent_echo.is_none());
    assert!(!state.sent_report);
    assert!(!state.completed_round);
}

#[tokio::test]
async fn leader_role_messages_are_ignored() {
    let mut h = harness();
    h.advance_to_round(1).await;
    let context = h.context(1);
    let signed = SignedObservation::sign(
        Observation::new(BigInt::from(7)).unwrap(),
        &context,
        &*h.keys[0],
    )
    .unwrap();
    h.follower
        .handle_message(
            Message::Observe { epoch: EPOCH, round: 1, signed_observation: signed },
            0,
        )
        .await;
    assert!(h.net.take().is_empty());
}

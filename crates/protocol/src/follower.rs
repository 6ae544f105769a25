//! The report-generation follower.
//!
//! One follower task runs per committee configuration. It owns its
//! [`FollowerState`] exclusively, consumes inbound messages from a single
//! queue, and emits events to the pacemaker and transmission subsystems
//! over bounded channels. Per-message handling is synchronous with respect
//! to the state, so state transitions are serialisable in queue order.
//!
//! Peer misbehaviour is never fatal: every handler validates, logs, and
//! drops. Stale-but-plausible messages (network delays, crossed rounds) are
//! dropped at debug level; protocol violations are dropped at warn level;
//! local faults (a broken data source, a signature that fails
//! self-verification) are logged at error level and the round is abandoned.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use oraclecore_config::SharedConfig;
use oraclecore_core::{
    detach_timeout, ContractTransmitter, DataSource, LocalConfig, OracleId, PrivateKeys,
};
use oraclecore_crypto::Address;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::{PacemakerEvent, TransmitEvent};
use crate::messages::{Message, MessageWithSender, NetSender};
use crate::observation::Observation;
use crate::signature::{
    AttestedReport, AttributedObservation, AttributedSignedObservation, ReportContext,
    SignatureError, SignedObservation,
};
use crate::telemetry::TelemetrySender;

/// A report request from the leader failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ReportValidationError {
    /// Observations are not sorted ascending by value
    #[error("observations not sorted by value")]
    NotSorted,

    /// An observer index is outside the committee
    #[error("oracle id {got} out of bounds for a committee of {n}")]
    ObserverOutOfBounds {
        /// The offending id
        got: OracleId,
        /// Committee size
        n: usize,
    },

    /// Two observations claim the same observer
    #[error("duplicate observation by oracle {0}")]
    DuplicateObserver(OracleId),

    /// An observation's signature does not verify under its observer's key
    #[error("invalid signed observation by oracle {observer}: {source}")]
    InvalidObservation {
        /// Claimed observer
        observer: OracleId,
        /// Underlying failure
        source: SignatureError,
    },

    /// Fewer than `2f + 1` distinct observations
    #[error("not enough observations in report; got {got}, need more than {bound}")]
    TooFewObservations {
        /// Distinct observers seen
        got: usize,
        /// The `2f` bound that must be exceeded
        bound: usize,
    },
}

/// Per-round follower bookkeeping.
///
/// `r` only ever advances within an epoch; every advance resets the other
/// fields.
#[derive(Debug)]
pub struct FollowerState {
    /// Current round
    pub r: u8,
    /// The report this follower echoed, if any, this round
    pub sent_echo: Option<AttestedReport>,
    /// Whether this follower returned a signed report this round
    pub sent_report: bool,
    /// Whether this round is complete from this follower's perspective
    pub completed_round: bool,
    /// Which committee members echoed the final report this round
    pub received_echo: Vec<bool>,
}

impl FollowerState {
    fn new(n: usize) -> Self {
        Self {
            r: 0,
            sent_echo: None,
            sent_report: false,
            completed_round: false,
            received_echo: vec![false; n],
        }
    }

    fn reset_round(&mut self, n: usize) {
        self.sent_echo = None;
        self.sent_report = false;
        self.completed_round = false;
        self.received_echo = vec![false; n];
    }

    /// Number of distinct echoes received this round.
    pub fn echo_count(&self) -> usize {
        self.received_echo.iter().filter(|echoed| **echoed).count()
    }
}

/// The follower side of report generation for one epoch.
pub struct ReportGenerationFollower {
    config: Arc<SharedConfig>,
    oracle_id: OracleId,
    epoch: u32,
    leader: OracleId,
    local_config: LocalConfig,
    /// On-chain signing address → oracle id, for report verification
    committee_signers: BTreeMap<Address, OracleId>,

    datasource: Arc<dyn DataSource>,
    contract_transmitter: Arc<dyn ContractTransmitter>,
    keys: Arc<dyn PrivateKeys>,
    net: Arc<dyn NetSender>,
    telemetry: Arc<dyn TelemetrySender>,

    inbound: mpsc::Receiver<MessageWithSender>,
    to_pacemaker: mpsc::Sender<PacemakerEvent>,
    to_transmission: mpsc::Sender<TransmitEvent>,
    shutdown: broadcast::Receiver<()>,

    state: FollowerState,
}

impl ReportGenerationFollower {
    /// Build a follower for `epoch`; the leader follows from the
    /// configuration's rotation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<SharedConfig>,
        oracle_id: OracleId,
        epoch: u32,
        local_config: LocalConfig,
        datasource: Arc<dyn DataSource>,
        contract_transmitter: Arc<dyn ContractTransmitter>,
        keys: Arc<dyn PrivateKeys>,
        net: Arc<dyn NetSender>,
        telemetry: Arc<dyn TelemetrySender>,
        inbound: mpsc::Receiver<MessageWithSender>,
        to_pacemaker: mpsc::Sender<PacemakerEvent>,
        to_transmission: mpsc::Sender<TransmitEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let n = config.n();
        let leader = config.leader(epoch);
        let committee_signers = config
            .public
            .oracle_identities
            .iter()
            .enumerate()
            .map(|(id, identity)| (identity.onchain_signing_address, id as OracleId))
            .collect();
        Self {
            config,
            oracle_id,
            epoch,
            leader,
            local_config,
            committee_signers,
            datasource,
            contract_transmitter,
            keys,
            net,
            telemetry,
            inbound,
            to_pacemaker,
            to_transmission,
            shutdown,
            state: FollowerState::new(n),
        }
    }

    /// Read-only view of the per-round state.
    pub fn state(&self) -> &FollowerState {
        &self.state
    }

    /// The current round's signing context.
    fn report_context(&self) -> ReportContext {
        ReportContext {
            config_digest: self.config.public.config_digest,
            epoch: self.epoch,
            round: self.state.r,
        }
    }

    /// Consume inbound messages until shutdown.
    pub async fn run(mut self) {
        info!(
            epoch = self.epoch,
            leader = self.leader,
            oracle_id = self.oracle_id,
            "report generation: follower running"
        );
        loop {
            tokio::select! {
                inbound = self.inbound.recv() => {
                    match inbound {
                        Some(MessageWithSender { msg, sender }) => {
                            self.handle_message(msg, sender).await;
                        }
                        None => {
                            debug!("report generation: inbound queue closed, exiting");
                            return;
                        }
                    }
                }
                _ = self.shutdown.recv() => {
                    debug!(epoch = self.epoch, "report generation: winding down");
                    return;
                }
            }
        }
    }

    /// Dispatch a single inbound message.
    ///
    /// [`run`](Self::run) calls this in queue order; tests drive it
    /// directly to exercise the state machine without the event loop.
    pub async fn handle_message(&mut self, msg: Message, sender: OracleId) {
        match msg {
            Message::ObserveReq { epoch, round } => {
                self.on_observe_request(epoch, round, sender).await;
            }
            Message::ReportReq {
                epoch,
                round,
                observations,
            } => {
                self.on_report_request(epoch, round, observations, sender)
                    .await;
            }
            Message::Final {
                epoch,
                round,
                report,
            } => {
                self.on_final(epoch, round, report, sender).await;
            }
            Message::FinalEcho {
                epoch,
                round,
                report,
            } => {
                self.on_final_echo(epoch, round, report, sender).await;
            }
            // Observe and Report are addressed to the epoch's leader; a
            // follower receiving one is seeing misrouted traffic.
            leader_msg @ (Message::Observe { .. } | Message::Report { .. }) => {
                debug!(
                    kind = leader_msg.kind(),
                    sender,
                    round = self.state.r,
                    "dropping leader-role message, this node is not the leader"
                );
            }
        }
    }

    /// The leader asked for an observation for a new round.
    async fn on_observe_request(&mut self, msg_epoch: u32, msg_round: u8, sender: OracleId) {
        if msg_epoch != self.epoch {
            debug!(
                round = self.state.r,
                msg_epoch, "dropping observe request from wrong epoch"
            );
            return;
        }
        if sender != self.leader {
            // Someone from this epoch is trying to usurp the lead
            warn!(
                round = self.state.r,
                sender, "dropping observe request from non-leader"
            );
            return;
        }
        if msg_round <= self.state.r {
            // Possible under network delay, so only debug
            debug!(
                round = self.state.r,
                msg_round, "dropping observe request for earlier round"
            );
            return;
        }
        if u16::from(msg_round) > u16::from(self.config.public.r_max) + 1 {
            // Bounds how often a malicious leader can trigger the
            // change-leader path within one epoch: rounds past RMax + 1
            // are simply invalid.
            warn!(
                round = self.state.r,
                r_max = self.config.public.r_max,
                msg_round,
                "dropping observe request with out-of-bounds round"
            );
            return;
        }

        self.state.r = msg_round;

        if self.state.r > self.config.public.r_max {
            debug!(
                round = self.state.r,
                r_max = self.config.public.r_max,
                "leader sent observe request past its expiration round, time to change leader"
            );
            self.emit_pacemaker(PacemakerEvent::ChangeLeader).await;
            return;
        }

        self.state.reset_round(self.config.n());

        self.telemetry.round_started(
            self.config.public.config_digest,
            self.epoch,
            self.state.r,
            self.leader,
        );

        let observation = self.observe_value().await;
        if observation.is_missing() {
            // Nothing to contribute this round; the rest of the committee
            // proceeds without us.
            return;
        }

        let context = self.report_context();
        let signed = match SignedObservation::sign(observation.clone(), &context, &*self.keys) {
            Ok(signed) => signed,
            Err(e) => {
                error!(
                    round = self.state.r,
                    error = %e,
                    "could not sign observation"
                );
                return;
            }
        };
        if let Err(e) = signed.verify(&context, &self.keys.public_key_offchain()) {
            error!(
                round = self.state.r,
                error = %e,
                "signing produced an observation signature that fails self-verification"
            );
            return;
        }

        debug!(round = self.state.r, "sent observation to leader");
        self.net
            .send_to(
                Message::Observe {
                    epoch: self.epoch,
                    round: self.state.r,
                    signed_observation: signed,
                },
                self.leader,
            )
            .await;
    }

    /// The leader proposed a report for this round.
    async fn on_report_request(
        &mut self,
        msg_epoch: u32,
        msg_round: u8,
        observations: Vec<AttributedSignedObservation>,
        sender: OracleId,
    ) {
        if msg_epoch != self.epoch {
            debug!(
                round = self.state.r,
                msg_epoch, "dropping report request from wrong epoch"
            );
            return;
        }
        if sender != self.leader {
            warn!(
                round = self.state.r,
                sender, "dropping report request from non-leader"
            );
            return;
        }
        if msg_round != self.state.r {
            // Too low happens under network delay, too high when this node
            // lost connectivity
            debug!(
                round = self.state.r,
                msg_round, "dropping report request from wrong round"
            );
            return;
        }
        if self.state.sent_report {
            warn!(
                round = self.state.r,
                "dropping report request, report already sent this round"
            );
            return;
        }
        if self.state.completed_round {
            warn!(
                round = self.state.r,
                "dropping report request, round already completed"
            );
            return;
        }
        if let Err(e) = self.verify_report_request(&observations) {
            error!(
                round = self.state.r,
                error = %e,
                "could not validate report sent by leader"
            );
            return;
        }

        if self.should_report(&observations).await {
            // Attribution was verified signature-by-signature above;
            // the onward report carries values and observers only.
            let attributed: Vec<AttributedObservation> = observations
                .into_iter()
                .map(|aso| AttributedObservation {
                    observation: aso.signed_observation.observation,
                    observer: aso.observer,
                })
                .collect();

            let context = self.report_context();
            let report = match AttestedReport::sign_as(attributed, &context, &*self.keys) {
                Ok(report) => report,
                Err(e) => {
                    error!(
                        round = self.state.r,
                        oracle_id = self.oracle_id,
                        error = %e,
                        "failed to sign report"
                    );
                    return;
                }
            };
            if let Err(e) = report.verify_contribution(&context, &self.keys.onchain_address()) {
                error!(
                    round = self.state.r,
                    oracle_id = self.oracle_id,
                    error = %e,
                    "could not verify own report signature"
                );
                return;
            }

            self.state.sent_report = true;
            self.net
                .send_to(
                    Message::Report {
                        epoch: self.epoch,
                        round: self.state.r,
                        report,
                    },
                    self.leader,
                )
                .await;
        } else {
            self.complete_round().await;
        }
    }

    /// The leader broadcast the fully attested report.
    async fn on_final(
        &mut self,
        msg_epoch: u32,
        msg_round: u8,
        report: AttestedReport,
        sender: OracleId,
    ) {
        if msg_epoch != self.epoch {
            debug!(
                round = self.state.r,
                msg_epoch, sender, "dropping final from wrong epoch"
            );
            return;
        }
        if msg_round != self.state.r {
            debug!(
                round = self.state.r,
                msg_round, "dropping final from wrong round"
            );
            return;
        }
        if sender != self.leader {
            warn!(
                round = self.state.r,
                sender, "dropping final from non-leader"
            );
            return;
        }
        if self.state.sent_echo.is_some() {
            debug!(
                round = self.state.r,
                "dropping final, already sent final echo"
            );
            return;
        }
        if !self.verify_attested_report(&report, sender) {
            return;
        }
        self.state.sent_echo = Some(report.clone());
        self.net
            .broadcast(Message::FinalEcho {
                epoch: self.epoch,
                round: self.state.r,
                report,
            })
            .await;
    }

    /// A committee member echoed the final report.
    async fn on_final_echo(
        &mut self,
        msg_epoch: u32,
        msg_round: u8,
        report: AttestedReport,
        sender: OracleId,
    ) {
        if msg_epoch != self.epoch {
            debug!(
                round = self.state.r,
                msg_epoch, sender, "dropping final echo from wrong epoch"
            );
            return;
        }
        if msg_round != self.state.r {
            debug!(
                round = self.state.r,
                msg_round, sender, "dropping final echo from wrong round"
            );
            return;
        }
        let Some(&already_echoed) = self.state.received_echo.get(sender as usize) else {
            warn!(sender, "dropping final echo from out-of-range sender");
            return;
        };
        if already_echoed {
            warn!(
                round = self.state.r,
                sender, "dropping extra final echo"
            );
            return;
        }
        if self.state.completed_round {
            debug!(
                round = self.state.r,
                "dropping final echo received after round completion"
            );
            return;
        }
        if !self.verify_attested_report(&report, sender) {
            return;
        }

        self.state.received_echo[sender as usize] = true;

        if self.state.sent_echo.is_none() {
            // Adopt and rebroadcast, so honest nodes that missed the
            // leader's final message still hear the report.
            self.state.sent_echo = Some(report.clone());
            self.net
                .broadcast(Message::FinalEcho {
                    epoch: self.epoch,
                    round: self.state.r,
                    report,
                })
                .await;
        }

        if self.state.echo_count() > self.config.public.f {
            // More than f echoes: at least one honest oracle is relaying
            // this exact report, safe to transmit.
            if let Some(report) = self.state.sent_echo.clone() {
                self.emit_transmit(TransmitEvent {
                    epoch: self.epoch,
                    round: self.state.r,
                    report,
                })
                .await;
            }
            self.complete_round().await;
        }
    }

    /// Gather a fresh observation under the data-source timeout.
    ///
    /// The data source is not trusted to return promptly, so the call runs
    /// detached; even an oracle that cannot observe stays useful by signing
    /// other oracles' reports.
    async fn observe_value(&self) -> Observation {
        let datasource = Arc::clone(&self.datasource);
        let result = detach_timeout(self.local_config.data_source_timeout, async move {
            datasource.observe().await
        })
        .await;

        match result {
            None => {
                error!(
                    round = self.state.r,
                    timeout = ?self.local_config.data_source_timeout,
                    "data source timed out"
                );
                Observation::missing()
            }
            Some(Err(e)) => {
                error!(round = self.state.r, error = %e, "data source errored");
                Observation::missing()
            }
            Some(Ok(raw)) => match Observation::new(raw) {
                Ok(observation) => observation,
                Err(e) => {
                    error!(round = self.state.r, error = %e, "observed value unusable");
                    Observation::missing()
                }
            },
        }
    }

    /// Decide whether the proposed report is worth signing.
    ///
    /// Consults the contract's latest transmission; when the contract cannot
    /// be reached we err on the side of producing too many reports rather
    /// than dropping out of the protocol.
    async fn should_report(&self, observations: &[AttributedSignedObservation]) -> bool {
        let transmitter = Arc::clone(&self.contract_transmitter);
        let details = match detach_timeout(self.local_config.blockchain_timeout, async move {
            transmitter.latest_transmission_details().await
        })
        .await
        {
            Some(Ok(details)) => details,
            Some(Err(e)) => {
                error!(
                    round = self.state.r,
                    error = %e,
                    "error fetching latest transmission details"
                );
                return true;
            }
            None => {
                error!(
                    round = self.state.r,
                    timeout = ?self.local_config.blockchain_timeout,
                    "timed out fetching latest transmission details"
                );
                return true;
            }
        };

        let answer = match Observation::new(details.latest_answer.clone()) {
            Ok(answer) => answer,
            Err(e) => {
                error!(round = self.state.r, error = %e, "on-chain answer unusable");
                return false;
            }
        };

        let median = &observations[observations.len() / 2]
            .signed_observation
            .observation;

        let initial_round = details.config_digest == self.config.public.config_digest
            && details.epoch == 0
            && details.round == 0;
        let deviation = median.deviates(&answer, self.config.public.alpha_ppb);
        let heartbeat =
            details.latest_timestamp + self.config.public.delta_c < SystemTime::now();
        let result = initial_round || deviation || heartbeat;

        info!(
            round = self.state.r,
            result, initial_round, deviation, heartbeat, "should_report"
        );
        result
    }

    /// Validate a leader's proposed report: sorted, bounds-checked,
    /// distinct, correctly signed, and backed by more than `2f` observers.
    fn verify_report_request(
        &self,
        observations: &[AttributedSignedObservation],
    ) -> Result<(), ReportValidationError> {
        if observations.windows(2).any(|pair| {
            pair[1]
                .signed_observation
                .observation
                .less(&pair[0].signed_observation.observation)
        }) {
            return Err(ReportValidationError::NotSorted);
        }

        let n = self.config.n();
        let context = self.report_context();
        let mut counted = vec![false; n];
        for attributed in observations {
            // The oracle id is untrusted, bounds-check before indexing
            let observer = attributed.observer;
            if observer as usize >= n {
                return Err(ReportValidationError::ObserverOutOfBounds { got: observer, n });
            }
            if counted[observer as usize] {
                return Err(ReportValidationError::DuplicateObserver(observer));
            }
            counted[observer as usize] = true;

            let public_key =
                &self.config.public.oracle_identities[observer as usize].offchain_public_key;
            attributed
                .signed_observation
                .verify(&context, public_key)
                .map_err(|source| ReportValidationError::InvalidObservation { observer, source })?;
        }

        let distinct = counted.iter().filter(|seen| **seen).count();
        let bound = 2 * self.config.public.f;
        if distinct <= bound {
            return Err(ReportValidationError::TooFewObservations {
                got: distinct,
                bound,
            });
        }
        Ok(())
    }

    /// True iff the report carries more than `f` valid signatures by
    /// distinct committee members.
    fn verify_attested_report(&self, report: &AttestedReport, sender: OracleId) -> bool {
        if report.signatures.len() <= self.config.public.f {
            warn!(
                sender,
                num_signatures = report.signatures.len(),
                f = self.config.public.f,
                "dropping final report with too few signatures"
            );
            return false;
        }
        match report.verify_signatures(&self.report_context(), &self.committee_signers) {
            Ok(_distinct) => true,
            Err(e) => {
                error!(
                    round = self.state.r,
                    sender,
                    error = %e,
                    "could not validate signatures on final report"
                );
                false
            }
        }
    }

    /// Conclude the round, telling the pacemaker it may advance.
    async fn complete_round(&mut self) {
        debug!(round = self.state.r, "report generation: completed round");
        self.state.completed_round = true;
        self.emit_pacemaker(PacemakerEvent::Progress).await;
    }

    async fn emit_pacemaker(&mut self, event: PacemakerEvent) {
        tokio::select! {
            result = self.to_pacemaker.send(event) => {
                if result.is_err() {
                    debug!("pacemaker channel closed");
                }
            }
            _ = self.shutdown.recv() => {}
        }
    }

    async fn emit_transmit(&mut self, event: TransmitEvent) {
        tokio::select! {
            result = self.to_transmission.send(event) => {
                if result.is_err() {
                    debug!("transmission channel closed");
                }
            }
            _ = self.shutdown.recv() => {}
        }
    }
}

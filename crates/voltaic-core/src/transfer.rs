//! Transfer outcomes and the pairwise transfer primitive.
//!
//! Every transfer attempt produces an [`EnergyTransferResult`]. Handler
//! operations never fail; the functions here interpret clamped results into
//! a [`TransferStatus`].

use serde::{Deserialize, Serialize};

use crate::fixed::Energy;
use crate::node::EnergyHandler;
use crate::unit::convert;

// ---------------------------------------------------------------------------
// Status taxonomy
// ---------------------------------------------------------------------------

/// Closed set of transfer outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Success,
    /// Some, but not all, of the requested amount moved.
    Warning,
    InvalidSource,
    InvalidDestination,
    SourceCannotExtract,
    DestinationCannotReceive,
    SourceEmpty,
    DestinationFull,
    IncompatibleEnergyTypes,
    CapacityExceeded,
    UnknownError,
}

impl TransferStatus {
    /// `Success` and `Warning` both mean energy may have moved.
    pub fn is_ok(self) -> bool {
        matches!(self, TransferStatus::Success | TransferStatus::Warning)
    }
}

// ---------------------------------------------------------------------------
// Result value
// ---------------------------------------------------------------------------

/// Immutable outcome of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyTransferResult {
    amount_transferred: Energy,
    status: TransferStatus,
    message: String,
}

impl EnergyTransferResult {
    pub fn new(amount_transferred: Energy, status: TransferStatus, message: impl Into<String>) -> Self {
        Self {
            amount_transferred,
            status,
            message: message.into(),
        }
    }

    pub fn success(amount: Energy) -> Self {
        Self::new(amount, TransferStatus::Success, "transfer successful")
    }

    pub fn partial(amount: Energy, reason: impl Into<String>) -> Self {
        Self::new(amount, TransferStatus::Warning, reason)
    }

    /// A failed attempt. Nothing moved.
    pub fn failure(status: TransferStatus, message: impl Into<String>) -> Self {
        Self::new(0, status, message)
    }

    pub fn amount_transferred(&self) -> Energy {
        self.amount_transferred
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Pair planning
// ---------------------------------------------------------------------------

/// A simulated transfer between one source and one destination.
///
/// `extract` is in the source's unit and `receive` in the destination's;
/// `receive == convert(extract, source_unit, destination_unit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPlan {
    pub extract: Energy,
    pub receive: Energy,
}

/// Why a pair could not be planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRejection {
    SourceEmpty,
    DestinationFull,
    /// The amount the source can give converts to zero in the destination unit.
    RoundsToZero,
}

/// Simulate moving up to `amount` (source units) from `source` into
/// `destination`.
///
/// Both sides are simulated and the committed amounts are capped by the
/// smaller of the two, so neither side's rate or capacity can be exceeded.
/// No state changes.
pub fn plan_pair<S, D>(source: &mut S, destination: &mut D, amount: Energy) -> Result<PairPlan, PlanRejection>
where
    S: EnergyHandler + ?Sized,
    D: EnergyHandler + ?Sized,
{
    let source_unit = source.energy_unit();
    let destination_unit = destination.energy_unit();

    let extractable = source.extract_energy(amount, true);
    if extractable == 0 {
        return Err(PlanRejection::SourceEmpty);
    }
    let offered = convert(extractable, source_unit, destination_unit);
    if offered == 0 {
        return Err(PlanRejection::RoundsToZero);
    }
    let acceptable = destination.receive_energy(offered, true);
    if acceptable == 0 {
        return Err(PlanRejection::DestinationFull);
    }

    let extract = if acceptable >= offered {
        extractable
    } else {
        // Back-convert what the destination takes; floor keeps the
        // destination side at or under `acceptable`.
        convert(acceptable, destination_unit, source_unit).min(extractable)
    };
    let receive = convert(extract, source_unit, destination_unit);
    if extract == 0 || receive == 0 {
        return Err(PlanRejection::RoundsToZero);
    }
    Ok(PairPlan { extract, receive })
}

/// Outcome of committing a [`PairPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairCommit {
    pub extracted: Energy,
    pub received: Energy,
}

impl PairCommit {
    pub fn matches(&self, plan: &PairPlan) -> bool {
        self.extracted == plan.extract && self.received == plan.receive
    }
}

/// Commit a plan produced by [`plan_pair`] with no intervening mutation.
///
/// If the destination takes less than the source released (a misbehaving
/// handler), the difference is offered back to the source.
pub fn commit_pair<S, D>(source: &mut S, destination: &mut D, plan: PairPlan) -> PairCommit
where
    S: EnergyHandler + ?Sized,
    D: EnergyHandler + ?Sized,
{
    let source_unit = source.energy_unit();
    let destination_unit = destination.energy_unit();

    let extracted = source.extract_energy(plan.extract, false);
    let received = destination.receive_energy(convert(extracted, source_unit, destination_unit), false);

    let commit = PairCommit { extracted, received };
    if !commit.matches(&plan) {
        let consumed = convert(received, destination_unit, source_unit);
        let refund = extracted.saturating_sub(consumed);
        if refund > 0 {
            source.receive_energy(refund, false);
        }
        tracing::warn!(
            planned_extract = plan.extract,
            planned_receive = plan.receive,
            extracted,
            received,
            refund,
            "committed transfer diverged from simulation"
        );
    }
    commit
}

// ---------------------------------------------------------------------------
// Pairwise transfer
// ---------------------------------------------------------------------------

/// Move up to `amount` (source units) from `source` to `destination`.
///
/// The reported amount is what the destination received, in its own unit.
pub fn transfer<S, D>(source: &mut S, destination: &mut D, amount: Energy, simulate: bool) -> EnergyTransferResult
where
    S: EnergyHandler + ?Sized,
    D: EnergyHandler + ?Sized,
{
    if source.energy_type() != destination.energy_type() {
        return EnergyTransferResult::failure(
            TransferStatus::IncompatibleEnergyTypes,
            format!(
                "cannot move {} energy into a {} handler",
                source.energy_type(),
                destination.energy_type()
            ),
        );
    }
    if !source.can_extract() {
        return EnergyTransferResult::failure(
            TransferStatus::SourceCannotExtract,
            "source cannot extract energy",
        );
    }
    if !destination.can_receive() {
        return EnergyTransferResult::failure(
            TransferStatus::DestinationCannotReceive,
            "destination cannot receive energy",
        );
    }

    let plan = match plan_pair(source, destination, amount) {
        Ok(plan) => plan,
        Err(rejection) => return rejection_result(rejection),
    };

    if !simulate {
        let commit = commit_pair(source, destination, plan);
        if !commit.matches(&plan) {
            return EnergyTransferResult::new(
                commit.received,
                TransferStatus::UnknownError,
                format!(
                    "transfer mismatch: extracted {}, received {}",
                    commit.extracted, commit.received
                ),
            );
        }
    }

    if plan.extract < amount {
        EnergyTransferResult::partial(
            plan.receive,
            format!("partial transfer: {} of {} requested", plan.extract, amount),
        )
    } else {
        EnergyTransferResult::success(plan.receive)
    }
}

/// Map a planning rejection onto the status taxonomy.
pub fn rejection_result(rejection: PlanRejection) -> EnergyTransferResult {
    match rejection {
        PlanRejection::SourceEmpty => EnergyTransferResult::failure(
            TransferStatus::SourceEmpty,
            "source has no energy to extract",
        ),
        PlanRejection::DestinationFull => EnergyTransferResult::failure(
            TransferStatus::DestinationFull,
            "destination cannot accept any energy",
        ),
        PlanRejection::RoundsToZero => EnergyTransferResult::partial(
            0,
            "amount rounds to zero after unit conversion",
        ),
    }
}

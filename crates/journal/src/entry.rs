//! The journal entry aggregate and its posting state machine.
//!
//! Lifecycle: Draft → (submit) → PendingApproval → (approve) → Approved →
//! (post) → Posted → (reverse) → Reversed, with PendingApproval → (reject) →
//! Draft. Only drafts are mutable. Posting assigns the per-company entry
//! number; reversal emits one event carrying the complete reversing entry so
//! the pair persists atomically or not at all.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use groupledger_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use groupledger_events::Event;
use groupledger_fx::CurrencyCode;

use crate::account::AccountId;
use crate::company::CompanyId;
use crate::period::PeriodRef;

/// Journal entry identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalEntryId(pub AggregateId);

impl JournalEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for JournalEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Entry status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Draft,
    PendingApproval,
    Approved,
    Posted,
    Reversed,
}

/// One line of a journal entry. Exactly one of `debit`/`credit` is set, in
/// transaction currency; `functional_amount` is the same value translated to
/// the company's functional currency at `exchange_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_id: AccountId,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub currency: CurrencyCode,
    pub exchange_rate: Decimal,
    pub functional_amount: Decimal,
}

impl JournalLine {
    pub fn debit(
        account_id: AccountId,
        amount: Decimal,
        currency: CurrencyCode,
        exchange_rate: Decimal,
    ) -> Self {
        Self {
            account_id,
            debit: Some(amount),
            credit: None,
            currency,
            exchange_rate,
            functional_amount: amount * exchange_rate,
        }
    }

    pub fn credit(
        account_id: AccountId,
        amount: Decimal,
        currency: CurrencyCode,
        exchange_rate: Decimal,
    ) -> Self {
        Self {
            account_id,
            debit: None,
            credit: Some(amount),
            currency,
            exchange_rate,
            functional_amount: amount * exchange_rate,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.debit.is_some()
    }

    /// Transaction-currency amount of whichever side is set.
    pub fn amount(&self) -> Decimal {
        self.debit.or(self.credit).unwrap_or(Decimal::ZERO)
    }

    pub fn functional_debit(&self) -> Decimal {
        if self.is_debit() {
            self.functional_amount
        } else {
            Decimal::ZERO
        }
    }

    pub fn functional_credit(&self) -> Decimal {
        if self.is_debit() {
            Decimal::ZERO
        } else {
            self.functional_amount
        }
    }

    /// The same line with debit and credit swapped (reversal).
    pub fn swapped(&self) -> Self {
        Self {
            account_id: self.account_id,
            debit: self.credit,
            credit: self.debit,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            functional_amount: self.functional_amount,
        }
    }
}

/// Structural line validation, applied at creation/amendment and re-checked
/// at posting.
fn validate_lines(lines: &[JournalLine]) -> Result<(), DomainError> {
    if lines.len() < 2 {
        return Err(DomainError::validation(
            "journal entry requires at least 2 lines",
        ));
    }

    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;

    for (idx, line) in lines.iter().enumerate() {
        match (line.debit, line.credit) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(DomainError::validation(format!(
                    "line {idx}: exactly one of debit/credit must be set"
                )));
            }
            _ => {}
        }
        if line.amount() <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {idx}: amount must be positive"
            )));
        }
        if line.exchange_rate <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line {idx}: exchange rate must be positive"
            )));
        }
        debit_total += line.functional_debit();
        credit_total += line.functional_credit();
    }

    if debit_total != credit_total {
        return Err(DomainError::business_rule(format!(
            "entry is out of balance: functional debits {debit_total} != credits {credit_total}"
        )));
    }

    Ok(())
}

/// Command: CreateDraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDraft {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub company_id: CompanyId,
    pub period: PeriodRef,
    pub entry_date: NaiveDate,
    pub description: Option<String>,
    pub lines: Vec<JournalLine>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AmendDraft (Draft status only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendDraft {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub description: Option<String>,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Submit for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submit {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approve {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reject back to Draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reject {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Discard a draft (Draft status only; the entry is gone after).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discard {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Post. The entry number has already been allocated from the
/// company's sequence stream by the posting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub entry_number: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reverse a posted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reverse {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub reversing_entry_id: JournalEntryId,
    pub reversing_entry_number: u64,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntryCommand {
    CreateDraft(CreateDraft),
    AmendDraft(AmendDraft),
    Submit(Submit),
    Approve(Approve),
    Reject(Reject),
    Discard(Discard),
    Post(Post),
    Reverse(Reverse),
}

/// Event: DraftCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftCreated {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub company_id: CompanyId,
    pub period: PeriodRef,
    pub entry_date: NaiveDate,
    pub description: Option<String>,
    pub lines: Vec<JournalLine>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DraftAmended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftAmended {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub description: Option<String>,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntrySubmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySubmitted {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryApproved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryApproved {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryRejected (returns to Draft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRejected {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DraftDiscarded (terminal for the draft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftDiscarded {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryPosted. From here the entry is immutable.
///
/// Self-contained: carries company, period and lines so balance projections
/// fold it without replaying the draft history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPosted {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub company_id: CompanyId,
    pub period: PeriodRef,
    pub entry_number: u64,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryReversed.
///
/// Carries the complete reversing entry (id, number, swapped lines) so a
/// single append persists both sides of the reversal; projections
/// materialize the reversing entry from this payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryReversed {
    pub tenant_id: TenantId,
    pub entry_id: JournalEntryId,
    pub company_id: CompanyId,
    pub period: PeriodRef,
    pub reversing_entry_id: JournalEntryId,
    pub reversing_entry_number: u64,
    pub reversing_lines: Vec<JournalLine>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntryEvent {
    DraftCreated(DraftCreated),
    DraftAmended(DraftAmended),
    EntrySubmitted(EntrySubmitted),
    EntryApproved(EntryApproved),
    EntryRejected(EntryRejected),
    DraftDiscarded(DraftDiscarded),
    EntryPosted(EntryPosted),
    EntryReversed(EntryReversed),
}

impl Event for JournalEntryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEntryEvent::DraftCreated(_) => "journal.entry.draft_created",
            JournalEntryEvent::DraftAmended(_) => "journal.entry.draft_amended",
            JournalEntryEvent::EntrySubmitted(_) => "journal.entry.submitted",
            JournalEntryEvent::EntryApproved(_) => "journal.entry.approved",
            JournalEntryEvent::EntryRejected(_) => "journal.entry.rejected",
            JournalEntryEvent::DraftDiscarded(_) => "journal.entry.draft_discarded",
            JournalEntryEvent::EntryPosted(_) => "journal.entry.posted",
            JournalEntryEvent::EntryReversed(_) => "journal.entry.reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEntryEvent::DraftCreated(e) => e.occurred_at,
            JournalEntryEvent::DraftAmended(e) => e.occurred_at,
            JournalEntryEvent::EntrySubmitted(e) => e.occurred_at,
            JournalEntryEvent::EntryApproved(e) => e.occurred_at,
            JournalEntryEvent::EntryRejected(e) => e.occurred_at,
            JournalEntryEvent::DraftDiscarded(e) => e.occurred_at,
            JournalEntryEvent::EntryPosted(e) => e.occurred_at,
            JournalEntryEvent::EntryReversed(e) => e.occurred_at,
        }
    }
}

/// Aggregate root: JournalEntry.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    id: JournalEntryId,
    tenant_id: Option<TenantId>,
    company_id: Option<CompanyId>,
    period: Option<PeriodRef>,
    entry_date: Option<NaiveDate>,
    status: EntryStatus,
    description: Option<String>,
    lines: Vec<JournalLine>,
    entry_number: Option<u64>,
    reversing_entry_id: Option<JournalEntryId>,
    version: u64,
    created: bool,
    discarded: bool,
}

impl JournalEntry {
    /// Empty aggregate instance for rehydration.
    pub fn empty(id: JournalEntryId) -> Self {
        Self {
            id,
            tenant_id: None,
            company_id: None,
            period: None,
            entry_date: None,
            status: EntryStatus::Draft,
            description: None,
            lines: Vec::new(),
            entry_number: None,
            reversing_entry_id: None,
            version: 0,
            created: false,
            discarded: false,
        }
    }

    pub fn id_typed(&self) -> JournalEntryId {
        self.id
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn period(&self) -> Option<PeriodRef> {
        self.period
    }

    pub fn lines(&self) -> &[JournalLine] {
        &self.lines
    }

    pub fn entry_number(&self) -> Option<u64> {
        self.entry_number
    }

    pub fn reversing_entry_id(&self) -> Option<JournalEntryId> {
        self.reversing_entry_id
    }

    pub fn exists(&self) -> bool {
        self.created && !self.discarded
    }
}

impl AggregateRoot for JournalEntry {
    type Id = JournalEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalEntryCommand;
    type Event = JournalEntryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEntryEvent::DraftCreated(e) => {
                self.id = e.entry_id;
                self.tenant_id = Some(e.tenant_id);
                self.company_id = Some(e.company_id);
                self.period = Some(e.period);
                self.entry_date = Some(e.entry_date);
                self.description = e.description.clone();
                self.lines = e.lines.clone();
                self.status = EntryStatus::Draft;
                self.created = true;
            }
            JournalEntryEvent::DraftAmended(e) => {
                self.description = e.description.clone();
                self.lines = e.lines.clone();
            }
            JournalEntryEvent::EntrySubmitted(_) => {
                self.status = EntryStatus::PendingApproval;
            }
            JournalEntryEvent::EntryApproved(_) => {
                self.status = EntryStatus::Approved;
            }
            JournalEntryEvent::EntryRejected(_) => {
                self.status = EntryStatus::Draft;
            }
            JournalEntryEvent::DraftDiscarded(_) => {
                self.discarded = true;
            }
            JournalEntryEvent::EntryPosted(e) => {
                self.status = EntryStatus::Posted;
                self.entry_number = Some(e.entry_number);
            }
            JournalEntryEvent::EntryReversed(e) => {
                self.status = EntryStatus::Reversed;
                self.reversing_entry_id = Some(e.reversing_entry_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalEntryCommand::CreateDraft(cmd) => self.handle_create(cmd),
            JournalEntryCommand::AmendDraft(cmd) => self.handle_amend(cmd),
            JournalEntryCommand::Submit(cmd) => self.handle_submit(cmd),
            JournalEntryCommand::Approve(cmd) => self.handle_approve(cmd),
            JournalEntryCommand::Reject(cmd) => self.handle_reject(cmd),
            JournalEntryCommand::Discard(cmd) => self.handle_discard(cmd),
            JournalEntryCommand::Post(cmd) => self.handle_post(cmd),
            JournalEntryCommand::Reverse(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl JournalEntry {
    fn ensure_exists(&self, tenant_id: TenantId, entry_id: JournalEntryId) -> Result<(), DomainError> {
        if !self.created || self.discarded {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::business_rule("tenant mismatch"));
        }
        if self.id != entry_id {
            return Err(DomainError::business_rule("entry id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: EntryStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::business_rule(format!(
                "cannot {action} an entry in {:?} status",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDraft) -> Result<Vec<JournalEntryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("entry already exists"));
        }
        validate_lines(&cmd.lines)?;

        Ok(vec![JournalEntryEvent::DraftCreated(DraftCreated {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            company_id: cmd.company_id,
            period: cmd.period,
            entry_date: cmd.entry_date,
            description: cmd.description.clone(),
            lines: cmd.lines.clone(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_amend(&self, cmd: &AmendDraft) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::Draft, "amend")?;
        validate_lines(&cmd.lines)?;

        Ok(vec![JournalEntryEvent::DraftAmended(DraftAmended {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            description: cmd.description.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &Submit) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::Draft, "submit")?;

        Ok(vec![JournalEntryEvent::EntrySubmitted(EntrySubmitted {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::PendingApproval, "approve")?;

        Ok(vec![JournalEntryEvent::EntryApproved(EntryApproved {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &Reject) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::PendingApproval, "reject")?;

        Ok(vec![JournalEntryEvent::EntryRejected(EntryRejected {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discard(&self, cmd: &Discard) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::Draft, "discard")?;

        Ok(vec![JournalEntryEvent::DraftDiscarded(DraftDiscarded {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn origin(&self) -> Result<(CompanyId, PeriodRef), DomainError> {
        match (self.company_id, self.period) {
            (Some(company_id), Some(period)) => Ok((company_id, period)),
            _ => Err(DomainError::business_rule("entry has no company/period")),
        }
    }

    fn handle_post(&self, cmd: &Post) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::Approved, "post")?;
        // Balance invariant re-checked at the point of no return.
        validate_lines(&self.lines)?;
        let (company_id, period) = self.origin()?;

        Ok(vec![JournalEntryEvent::EntryPosted(EntryPosted {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            company_id,
            period,
            entry_number: cmd.entry_number,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &Reverse) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.entry_id)?;
        self.ensure_status(EntryStatus::Posted, "reverse")?;
        let (company_id, period) = self.origin()?;

        let reversing_lines: Vec<JournalLine> = self.lines.iter().map(JournalLine::swapped).collect();

        Ok(vec![JournalEntryEvent::EntryReversed(EntryReversed {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            company_id,
            period,
            reversing_entry_id: cmd.reversing_entry_id,
            reversing_entry_number: cmd.reversing_entry_number,
            reversing_lines,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

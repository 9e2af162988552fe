//! Canonical transition table for the trade workflow.

use trade_ledger_types::{DocType, LedgerAction, Role, TransactionStatus};

use TransactionStatus::{Disputed, InProgress, Pending};

/// Which transaction party, if any, the actor must be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRequirement {
    None,
    /// Must be the transaction's buyer
    Buyer,
    /// Must be the transaction's seller
    Seller,
    /// Buyers and sellers must be a party; other permitted roles are exempt
    EitherParty,
}

/// Document a step must find before it can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Present(DocType),
    /// The step produces this document, so it must not exist yet
    Absent(DocType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub action: LedgerAction,
    pub roles: &'static [Role],
    /// Statuses that accept the action; empty for the step that opens a transaction
    pub from: &'static [TransactionStatus],
    pub to: TransactionStatus,
    pub party: PartyRequirement,
    pub requires: &'static [Requirement],
    /// Document type created by the step, if any
    pub creates: Option<DocType>,
}

impl TransitionRule {
    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn accepts(&self, status: TransactionStatus) -> bool {
        !status.is_terminal() && self.from.contains(&status)
    }

    pub fn opens_transaction(&self) -> bool {
        self.from.is_empty()
    }
}

/// The rule for `action`
pub const fn rule_for(action: LedgerAction) -> TransitionRule {
    use Requirement::{Absent, Present};

    match action {
        LedgerAction::CreatePo => TransitionRule {
            action,
            roles: &[Role::Buyer],
            from: &[],
            to: Pending,
            party: PartyRequirement::None,
            requires: &[],
            creates: Some(DocType::Po),
        },
        LedgerAction::IssueLoc => TransitionRule {
            action,
            roles: &[Role::Bank],
            from: &[Pending],
            to: Pending,
            party: PartyRequirement::None,
            requires: &[Present(DocType::Po), Absent(DocType::Loc)],
            creates: Some(DocType::Loc),
        },
        LedgerAction::Verify => TransitionRule {
            action,
            roles: &[Role::Auditor, Role::Bank],
            from: &[Pending],
            to: InProgress,
            party: PartyRequirement::None,
            requires: &[Present(DocType::Po), Present(DocType::Loc)],
            creates: None,
        },
        LedgerAction::UploadBol => TransitionRule {
            action,
            roles: &[Role::Seller],
            from: &[InProgress],
            to: InProgress,
            party: PartyRequirement::Seller,
            requires: &[Absent(DocType::BillOfLading)],
            creates: Some(DocType::BillOfLading),
        },
        LedgerAction::IssueInvoice => TransitionRule {
            action,
            roles: &[Role::Seller],
            from: &[InProgress],
            to: InProgress,
            party: PartyRequirement::Seller,
            requires: &[Absent(DocType::Invoice)],
            creates: Some(DocType::Invoice),
        },
        LedgerAction::MarkReceived => TransitionRule {
            action,
            roles: &[Role::Buyer],
            from: &[InProgress],
            to: InProgress,
            party: PartyRequirement::Buyer,
            requires: &[Present(DocType::BillOfLading)],
            creates: None,
        },
        LedgerAction::PayInvoice => TransitionRule {
            action,
            roles: &[Role::Bank],
            from: &[InProgress],
            to: TransactionStatus::Completed,
            party: PartyRequirement::None,
            requires: &[Present(DocType::Invoice)],
            creates: None,
        },
        LedgerAction::Dispute => TransitionRule {
            action,
            roles: &[Role::Buyer, Role::Seller, Role::Admin],
            from: &[InProgress],
            to: Disputed,
            party: PartyRequirement::EitherParty,
            requires: &[],
            creates: None,
        },
        LedgerAction::Resolve => TransitionRule {
            action,
            roles: &[Role::Bank, Role::Admin],
            from: &[Disputed],
            to: TransactionStatus::Completed,
            party: PartyRequirement::None,
            requires: &[],
            creates: None,
        },
    }
}

/// Status an action leads to from `from`, if the table allows it at all
pub fn next_status(action: LedgerAction, from: TransactionStatus) -> Option<TransactionStatus> {
    let rule = rule_for(action);
    rule.accepts(from).then_some(rule.to)
}

use crate::errors::{EngineError, EngineResult};
use crate::ledger::contract::Contract;
use crate::ledger::receipt::Receipt;
use crate::models::OptionType;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};

/// Registry of listed contracts and the receipts issued against them.
///
/// Invariants:
/// - every name in `calls`/`puts` is a key of `contracts`
/// - every receipt id queued in `purchased` is a key of `receipts`
/// - `purchased[name]` exists only while it holds at least one id
///
/// Not internally synchronized; the server wraps it in a mutex.
#[derive(Debug, Default)]
pub struct Options {
    contracts: HashMap<String, Contract>,
    /// Contract name -> receipt ids, oldest first.
    purchased: HashMap<String, VecDeque<String>>,
    receipts: HashMap<String, Receipt>,
    calls: VecDeque<String>,
    puts: VecDeque<String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contracts(contracts: impl IntoIterator<Item = Contract>) -> Self {
        let mut options = Self::new();
        for c in contracts {
            options.register(c);
        }
        options
    }

    /// List a contract. A duplicate name is logged and ignored; returns
    /// whether the contract was added.
    pub fn register(&mut self, contract: Contract) -> bool {
        if self.contracts.contains_key(&contract.name) {
            tracing::warn!(contract = %contract.name, "contract already registered");
            return false;
        }
        match contract.option_type {
            OptionType::Call => self.calls.push_back(contract.name.clone()),
            OptionType::Put => self.puts.push_back(contract.name.clone()),
        }
        tracing::debug!(contract = %contract.name, open_interest = contract.open_interest, "contract registered");
        self.contracts.insert(contract.name.clone(), contract);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn get_contract(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    /// Look a contract up by its defining fields.
    pub fn find_contract(&self, option_type: OptionType, strike: f64, expiration: NaiveDate) -> Option<&Contract> {
        self.contracts.get(&Contract::format_name(option_type, strike, expiration))
    }

    /// Calls in listing order.
    pub fn calls(&self) -> impl Iterator<Item = &Contract> {
        self.calls.iter().filter_map(|n| self.contracts.get(n))
    }

    /// Puts in listing order.
    pub fn puts(&self) -> impl Iterator<Item = &Contract> {
        self.puts.iter().filter_map(|n| self.contracts.get(n))
    }

    /// Calls then puts.
    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.calls().chain(self.puts())
    }

    pub fn itm_contracts(&self, spot: f64) -> impl Iterator<Item = &Contract> {
        self.contracts().filter(move |c| c.itm(spot))
    }

    pub fn receipt(&self, id: &str) -> Option<&Receipt> {
        self.receipts.get(id)
    }

    /// Outstanding receipts for a contract, oldest first.
    pub fn receipts_for(&self, contract_name: &str) -> Vec<&Receipt> {
        self.purchased
            .get(contract_name)
            .map(|ids| ids.iter().filter_map(|id| self.receipts.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn purchase(&mut self, contract_name: &str, amount: i64, owner: &str) -> EngineResult<Receipt> {
        self.purchase_at(contract_name, amount, owner, Utc::now())
    }

    /// Buy `amount` contracts at an explicit purchase time. Nothing is
    /// mutated unless the whole purchase succeeds.
    pub fn purchase_at(
        &mut self,
        contract_name: &str,
        amount: i64,
        owner: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<Receipt> {
        if amount <= 0 {
            return Err(EngineError::InvalidAmount(amount));
        }
        let id = Receipt::format_id(owner.trim(), contract_name, at);
        if self.receipts.contains_key(&id) {
            return Err(EngineError::DuplicateReceiptId(id));
        }
        let contract = self
            .contracts
            .get_mut(contract_name)
            .ok_or_else(|| EngineError::UnknownContract(contract_name.to_string()))?;

        let receipt = contract.purchase(amount, owner, at)?;
        tracing::info!(
            receipt = %receipt.id,
            contract = contract_name,
            amount,
            open_interest = contract.open_interest,
            "contract purchased"
        );

        self.purchased
            .entry(contract_name.to_string())
            .or_default()
            .push_back(receipt.id.clone());
        self.receipts.insert(receipt.id.clone(), receipt.clone());
        Ok(receipt)
    }

    /// Settle a receipt at `closing_price` and retire it.
    pub fn exercise(&mut self, closing_price: f64, receipt_id: &str) -> EngineResult<f64> {
        let receipt = self
            .receipts
            .get(receipt_id)
            .ok_or_else(|| EngineError::UnknownReceipt(receipt_id.to_string()))?;
        let contract = self
            .contracts
            .get(&receipt.contract_name)
            .ok_or_else(|| EngineError::UnknownContract(receipt.contract_name.clone()))?;

        let value = contract.exercise(closing_price, receipt);
        let contract_name = contract.name.clone();
        self.retire_receipt(&contract_name, receipt_id);

        tracing::info!(receipt = receipt_id, closing_price, value, "receipt exercised");
        Ok(value)
    }

    /// Delist a contract. Returns it with its outstanding receipts, which
    /// leave the registry too.
    pub fn remove(&mut self, contract_name: &str) -> EngineResult<(Contract, Vec<Receipt>)> {
        let contract = self
            .contracts
            .remove(contract_name)
            .ok_or_else(|| EngineError::UnknownContract(contract_name.to_string()))?;

        let side = match contract.option_type {
            OptionType::Call => &mut self.calls,
            OptionType::Put => &mut self.puts,
        };
        side.retain(|n| n != contract_name);

        let receipts: Vec<Receipt> = self
            .purchased
            .remove(contract_name)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.receipts.remove(&id))
            .collect();

        tracing::info!(contract = contract_name, receipts = receipts.len(), "contract removed");
        Ok((contract, receipts))
    }

    /// Expiry settlement of every outstanding receipt is not supported.
    pub fn expire_contract(&mut self, contract_name: &str, _closing_price: f64) -> EngineResult<Vec<f64>> {
        if !self.contracts.contains_key(contract_name) {
            return Err(EngineError::UnknownContract(contract_name.to_string()));
        }
        Err(EngineError::NotImplemented("contract expiry"))
    }

    pub fn intrinsic_value(&self, contract_name: &str, spot: f64) -> EngineResult<f64> {
        Ok(self.require(contract_name)?.intrinsic_value(spot))
    }

    pub fn premium(
        &self,
        contract_name: &str,
        spot: Option<f64>,
        amount: u64,
        purchase_price: Option<f64>,
    ) -> EngineResult<f64> {
        Ok(self.require(contract_name)?.premium(spot, amount, purchase_price))
    }

    /// Premium of a held position at its purchase price.
    pub fn premium_for_receipt(&self, receipt_id: &str, spot: Option<f64>) -> EngineResult<f64> {
        let receipt = self
            .receipts
            .get(receipt_id)
            .ok_or_else(|| EngineError::UnknownReceipt(receipt_id.to_string()))?;
        self.premium(&receipt.contract_name, spot, receipt.amount, Some(receipt.purchase_price))
    }

    fn require(&self, contract_name: &str) -> EngineResult<&Contract> {
        self.contracts
            .get(contract_name)
            .ok_or_else(|| EngineError::UnknownContract(contract_name.to_string()))
    }

    fn retire_receipt(&mut self, contract_name: &str, receipt_id: &str) {
        self.receipts.remove(receipt_id);
        if let Some(ids) = self.purchased.get_mut(contract_name) {
            ids.retain(|id| id != receipt_id);
            if ids.is_empty() {
                self.purchased.remove(contract_name);
            }
        }
    }
}

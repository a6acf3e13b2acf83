use courier_ports::BrokerFault;
use log::debug;

use super::manager::{ConnectionHandle, ConnectionManager};
use crate::error::{ConnectionError, GatewayError};

/// Per-operation allowance of connection recoveries
///
/// Each operation may recover from at most `retry_budget` transport faults.
/// Protocol faults are never recovered and come back as
/// [`GatewayError::Broker`].
pub struct Recovery<'a> {
    manager: &'a ConnectionManager,
    used: u32,
    budget: u32,
}

impl<'a> Recovery<'a> {
    pub(crate) fn new(manager: &'a ConnectionManager) -> Self {
        Self {
            manager,
            used: 0,
            budget: manager.failover().retry_budget(),
        }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    /// Hand a fault seen on connection `generation` to the manager
    pub async fn recover(
        &mut self,
        generation: u64,
        fault: BrokerFault,
    ) -> Result<ConnectionHandle, GatewayError> {
        if !fault.is_transport() {
            return Err(GatewayError::Broker(fault));
        }
        if self.budget > 0 && self.used >= self.budget {
            return Err(ConnectionError::RecoveryBudgetSpent {
                recoveries: self.used,
                source: fault,
            }
            .into());
        }

        self.used += 1;
        debug!(
            "Recovering from transport fault ({}/{}): {}",
            self.used, self.budget, fault
        );
        Ok(self.manager.report_fault(generation, fault).await?)
    }
}

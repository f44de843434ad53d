use crate::orders::OrderStatus;

/// Service for managing order status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Statuses reachable from `from` in one update
    ///
    /// # Transition table
    /// - pendente → preparando, pronto, saiu_entrega, entregue, concluido, cancelado
    /// - preparando → pronto, saiu_entrega, entregue, concluido, cancelado
    /// - pronto → saiu_entrega, entregue, concluido, cancelado
    /// - saiu_entrega → entregue, concluido, cancelado
    /// - entregue → concluido, cancelado
    /// - concluido, cancelado → (terminal)
    pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match from {
            Pendente => &[Preparando, Pronto, SaiuEntrega, Entregue, Concluido, Cancelado],
            Preparando => &[Pronto, SaiuEntrega, Entregue, Concluido, Cancelado],
            Pronto => &[SaiuEntrega, Entregue, Concluido, Cancelado],
            SaiuEntrega => &[Entregue, Concluido, Cancelado],
            Entregue => &[Concluido, Cancelado],
            Concluido | Cancelado => &[],
        }
    }

    /// Check if a status transition is valid
    ///
    /// # Arguments
    /// * `from` - Current order status
    /// * `to` - Desired new status
    ///
    /// # Returns
    /// `true` if the transition is valid, `false` otherwise.
    /// Same status is always valid (idempotent no-op).
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        from == to || Self::allowed_targets(from).contains(&to)
    }

    /// Attempt to transition from one status to another
    ///
    /// # Returns
    /// `Ok(to)` if the transition is valid, `Err(message)` otherwise
    pub fn transition(from: OrderStatus, to: OrderStatus) -> Result<OrderStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid status transition from {} to {}", from, to))
        }
    }
}

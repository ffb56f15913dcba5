//! In-memory venue for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::core::{
    CloseAmount, CloseResult, Error, OrderAck, OrderRequest, PositionSnapshot, Result, Symbol,
    Venue,
};

#[derive(Default)]
pub struct MockVenue {
    positions: Mutex<Vec<PositionSnapshot>>,
    fail_positions: Mutex<bool>,
    /// Scripted submit outcomes; when empty, orders are accepted with sequential ids
    responses: Mutex<VecDeque<Result<OrderAck>>>,
    pub submitted: Mutex<Vec<OrderRequest>>,
    pub closes: Mutex<Vec<(Symbol, CloseAmount)>>,
    close_all: Mutex<Vec<CloseResult>>,
}

impl MockVenue {
    pub fn set_positions(&self, rows: Vec<PositionSnapshot>) {
        *self.positions.lock() = rows;
    }

    pub fn fail_positions(&self, fail: bool) {
        *self.fail_positions.lock() = fail;
    }

    pub fn push_response(&self, response: Result<OrderAck>) {
        self.responses.lock().push_back(response);
    }

    pub fn set_close_all(&self, results: Vec<CloseResult>) {
        *self.close_all.lock() = results;
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().len()
    }

    pub fn last_submitted(&self) -> Option<OrderRequest> {
        self.submitted.lock().last().cloned()
    }
}

#[async_trait]
impl Venue for MockVenue {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let n = {
            let mut submitted = self.submitted.lock();
            submitted.push(order.clone());
            submitted.len()
        };
        match self.responses.lock().pop_front() {
            Some(response) => response,
            None => Ok(OrderAck {
                id: format!("order-{n}"),
                symbol: order.symbol.clone(),
            }),
        }
    }

    async fn fetch_positions(&self, symbol: Option<&Symbol>) -> Result<Vec<PositionSnapshot>> {
        if *self.fail_positions.lock() {
            return Err(Error::VenueRejection {
                status: 500,
                reason: "internal error".into(),
            });
        }
        let positions = self.positions.lock();
        match symbol {
            None => Ok(positions.clone()),
            Some(s) => {
                let rows: Vec<_> = positions.iter().filter(|p| &p.symbol == s).cloned().collect();
                if rows.is_empty() {
                    Err(Error::VenueRejection {
                        status: 404,
                        reason: "position does not exist".into(),
                    })
                } else {
                    Ok(rows)
                }
            }
        }
    }

    async fn close_position(
        &self,
        symbol: &Symbol,
        amount: CloseAmount,
    ) -> Result<serde_json::Value> {
        self.closes.lock().push((symbol.clone(), amount));
        Ok(serde_json::json!({ "symbol": symbol.as_str(), "id": "close-1" }))
    }

    async fn close_all_positions(&self, _cancel_orders: bool) -> Result<Vec<CloseResult>> {
        Ok(self.close_all.lock().clone())
    }
}

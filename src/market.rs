//! Stable HTTP-representation payloads (spec.md §6). These are plain,
//! serializable DTOs — the HTTP layer itself is out of this crate's
//! scope; a surrounding service serializes these directly.

use crate::book::Book;
use crate::order::Side;
use crate::pair::AssetPair;
use serde::Serialize;

/// `{ lastPrice, lastSide, bid, bidAmount, ask, askAmount }`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatusPayload {
    pub last_price: Option<u64>,
    pub last_side: Option<Side>,
    pub bid: Option<u64>,
    pub bid_amount: Option<u64>,
    pub ask: Option<u64>,
    pub ask_amount: Option<u64>,
}

impl MarketStatusPayload {
    pub fn from_book(book: &Book) -> Self {
        let bid = book.best_bid();
        let ask = book.best_ask();
        let bid_amount = bid.and_then(|p| book.bid_levels().into_iter().find(|(lp, _)| *lp == p)).map(|(_, a)| a);
        let ask_amount = ask.and_then(|p| book.ask_levels().into_iter().find(|(lp, _)| *lp == p)).map(|(_, a)| a);
        Self {
            last_price: book.last_trade.as_ref().map(|o| o.price),
            last_side: book.last_trade.as_ref().map(|o| o.side),
            bid,
            bid_amount,
            ask,
            ask_amount,
        }
    }
}

/// One `{price, amount}` entry of an order book level.
#[derive(Debug, Clone, Serialize)]
pub struct PriceLevelPayload {
    pub price: u64,
    pub amount: u64,
}

/// `{ timestamp, pair, bids, asks }`, bids descending, asks ascending.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookPayload {
    pub timestamp: u64,
    pub pair: AssetPair,
    pub bids: Vec<PriceLevelPayload>,
    pub asks: Vec<PriceLevelPayload>,
}

impl OrderBookPayload {
    pub fn from_book(pair: AssetPair, book: &Book, timestamp: u64) -> Self {
        Self {
            timestamp,
            pair,
            bids: book
                .bid_levels()
                .into_iter()
                .map(|(price, amount)| PriceLevelPayload { price, amount })
                .collect(),
            asks: book
                .ask_levels()
                .into_iter()
                .map(|(price, amount)| PriceLevelPayload { price, amount })
                .collect(),
        }
    }
}

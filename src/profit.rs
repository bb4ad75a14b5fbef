use crate::error;
use crate::point;
use crate::utils;

/// The optimal single buy-then-sell pair over a range.
///
/// Independent of the amount invested: for a fixed fund the profit of a pair
/// is proportional to `sell / buy - 1`, so the best pair is the same for every
/// fund size.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BestPair {
    pub buy: point::Point,
    pub sell: point::Point,
}

impl BestPair {
    /// Relative return of the pair, `(sell - buy) / buy`.
    pub fn ratio(&self) -> f64 {
        (self.sell.price - self.buy.price) / self.buy.price
    }

    /// Notional profit of investing `funds` at the buy point.
    pub fn notional_profit(&self, funds: f64) -> f64 {
        (self.sell.price - self.buy.price) * (funds / self.buy.price)
    }

    fn duration_ms(&self) -> i64 {
        self.sell.millis() - self.buy.millis()
    }

    /// Whether `self` should replace `other` as the best pair.
    ///
    /// Higher return wins. On equal return the shorter holding period wins,
    /// then the earlier buy.
    fn beats(&self, ratio: f64, other: &BestPair, other_ratio: f64) -> bool {
        if ratio != other_ratio {
            return ratio > other_ratio;
        }
        match self.duration_ms().cmp(&other.duration_ms()) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.buy.millis() < other.buy.millis(),
        }
    }
}

/// Incremental one-pass best-trade search.
///
/// Keeps the lowest-priced point seen so far and scores every later point as
/// a sell against it. For a fixed sell the best buy is the cheapest earlier
/// point, which is exactly the running minimum; for a fixed buy the profit
/// grows with the sell price, which the forward pass visits in turn. The
/// running minimum moves on equal prices too, so for each sell the buy is the
/// latest of the cheapest points and the holding period is as short as it can be.
#[derive(Debug, Default)]
pub struct ProfitScanner {
    running_min: Option<point::Point>,
    best: Option<(BestPair, f64)>,
    seen: usize,
}

impl ProfitScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next point of the range.
    ///
    /// # Errors
    /// * `InvalidState` if a candidate buy price is zero or negative.
    pub fn push(&mut self, p: point::Point) -> error::Result<()> {
        self.seen += 1;
        let Some(min) = self.running_min else {
            self.running_min = Some(p);
            return Ok(());
        };
        if min.price <= 0.0 {
            return Err(error::EngineError::InvalidState(format!(
                "buy price {} at {} is not positive",
                min.price,
                utils::format_timestamp(&min.timestamp)
            )));
        }

        let candidate = BestPair { buy: min, sell: p };
        let ratio = candidate.ratio();
        if ratio > 0.0 {
            let replace = match &self.best {
                None => true,
                Some((best, best_ratio)) => candidate.beats(ratio, best, *best_ratio),
            };
            if replace {
                self.best = Some((candidate, ratio));
            }
        }

        if p.price <= min.price {
            self.running_min = Some(p);
        }
        Ok(())
    }

    /// Number of points fed so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Returns the best pair found.
    ///
    /// # Errors
    /// * `EmptyRange` if fewer than two points were fed.
    /// * `NoProfitableTrade` if no pair has a positive return.
    pub fn finish(self) -> error::Result<BestPair> {
        if self.seen < 2 {
            return Err(error::EngineError::EmptyRange {
                found: self.seen,
                needed: 2,
            });
        }
        self.best
            .map(|(pair, _)| pair)
            .ok_or(error::EngineError::NoProfitableTrade)
    }
}

/// Finds the best buy-then-sell pair in an ordered sequence of points.
///
/// # Arguments
/// * `points` - Ordered points of the range; the first error aborts the search.
///
/// # Returns
/// * `error::Result<BestPair>`
pub fn best_trade<I>(points: I) -> error::Result<BestPair>
where
    I: IntoIterator<Item = error::Result<point::Point>>,
{
    let mut scanner = ProfitScanner::new();
    for p in points {
        scanner.push(p?)?;
    }
    scanner.finish()
}

/// Rejects reports whose rounded profit is below `min_profit`.
///
/// The floor applies to the profit as reported, after the price difference
/// and the share count are rounded, so a sub-cent move never comes back as a
/// zero-profit trade.
pub fn ensure_meaningful(report: &ProfitReport, min_profit: f64) -> error::Result<()> {
    if report.profit <= 0.0 || report.profit < min_profit {
        return Err(error::EngineError::NoProfitableTrade);
    }
    Ok(())
}

/// Result of a profit query, rounded for presentation.
///
/// Monetary figures are rounded half-up to cents and the share count to four
/// decimal places.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitReport {
    #[serde(serialize_with = "utils::serialize_timestamp")]
    pub buy_time: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "utils::serialize_timestamp")]
    pub sell_time: chrono::DateTime<chrono::Utc>,
    pub buy_price: f64,
    pub sell_price: f64,
    pub num_shares: f64,
    pub profit: f64,
    pub total_cost: f64,
    pub net_profit: f64,
    pub profit_percent: f64,
    pub chart_data: Vec<point::Point>,
}

impl ProfitReport {
    /// Builds the report for investing `funds` in `pair`.
    ///
    /// `numShares = round4(funds / buy)`, `profit = round2(round2(sell - buy) *
    /// numShares)`, `totalCost = round2(buy * numShares)`, no fees.
    pub fn new(pair: &BestPair, funds: f64, chart_data: Vec<point::Point>) -> error::Result<Self> {
        let buy = utils::to_decimal(pair.buy.price)?;
        let sell = utils::to_decimal(pair.sell.price)?;
        let funds = utils::to_decimal(funds)?;
        if buy.is_zero() {
            return Err(error::EngineError::InvalidState("buy price is zero".to_string()));
        }

        let num_shares = utils::round_half_up(funds / buy, 4);
        let price_diff = utils::round_half_up(sell - buy, 2);
        let profit = utils::round_half_up(price_diff * num_shares, 2);
        let total_cost = utils::round_half_up(buy * num_shares, 2);
        let profit_percent = if total_cost.is_zero() {
            rust_decimal::Decimal::ZERO
        } else {
            utils::round_half_up(profit / total_cost * rust_decimal::Decimal::ONE_HUNDRED, 2)
        };

        Ok(ProfitReport {
            buy_time: pair.buy.timestamp,
            sell_time: pair.sell.timestamp,
            buy_price: utils::from_decimal(utils::round_half_up(buy, 2))?,
            sell_price: utils::from_decimal(utils::round_half_up(sell, 2))?,
            num_shares: utils::from_decimal(num_shares)?,
            profit: utils::from_decimal(profit)?,
            total_cost: utils::from_decimal(total_cost)?,
            net_profit: utils::from_decimal(profit)?,
            profit_percent: utils::from_decimal(profit_percent)?,
            chart_data,
        })
    }
}

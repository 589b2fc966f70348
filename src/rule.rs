use crate::catalog::AssetSymbol;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DELIMITER: char = '|';
const FIELD_COUNT: usize = 6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid threshold: {0:?}")]
    InvalidThreshold(String),

    #[error("unknown direction: {0:?}")]
    UnknownDirection(String),

    #[error("unknown state tag: {0:?}")]
    UnknownState(String),

    #[error("threshold must be a positive number, got {0}")]
    NonPositiveThreshold(f64),

    #[error("{0} must not contain '|' or line breaks")]
    ReservedCharacter(&'static str),
}

/// Which way the price has to cross the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Human label used in replies and notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Above => "High limit",
            Direction::Below => "Low limit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => f.write_str("Above"),
            Direction::Below => f.write_str("Below"),
        }
    }
}

impl FromStr for Direction {
    type Err = RuleError;

    // highLimit / lowLimit are the tokens older alarm files were written with.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "above" | "highlimit" => Ok(Direction::Above),
            "below" | "lowlimit" => Ok(Direction::Below),
            _ => Err(RuleError::UnknownDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Active,
    Closed,
}

impl fmt::Display for RuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleState::Active => f.write_str("Active"),
            RuleState::Closed => f.write_str("Closed"),
        }
    }
}

impl FromStr for RuleState {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(RuleState::Active),
            "Closed" => Ok(RuleState::Closed),
            _ => Err(RuleError::UnknownState(s.to_string())),
        }
    }
}

/// One barrier rule as stored on a single line of the alert file:
///
/// `<State>|<owner>|<createdAt>|<asset>|<threshold>|<direction>`
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
    pub owner: String,
    pub created_at: String,
    pub asset: AssetSymbol,
    pub threshold: f64,
    pub direction: Direction,
    pub state: RuleState,
}

impl RuleRecord {
    /// Builds a fresh Active rule from user input.
    pub fn new(
        owner: &str,
        created_at: &str,
        asset: AssetSymbol,
        threshold: f64,
        direction: Direction,
    ) -> Result<Self, RuleError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(RuleError::NonPositiveThreshold(threshold));
        }
        check_field("owner", owner)?;
        check_field("creation date", created_at)?;
        check_field("asset", asset.as_str())?;

        Ok(Self {
            owner: owner.to_string(),
            created_at: created_at.to_string(),
            asset,
            threshold,
            direction,
            state: RuleState::Active,
        })
    }

    pub fn parse(line: &str) -> Result<Self, RuleError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(RuleError::FieldCount(fields.len()));
        }

        let state = fields[0].parse::<RuleState>()?;
        let threshold = fields[4]
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| RuleError::InvalidThreshold(fields[4].to_string()))?;
        let direction = fields[5].parse::<Direction>()?;

        Ok(Self {
            owner: fields[1].to_string(),
            created_at: fields[2].to_string(),
            asset: AssetSymbol::from_stored(fields[3]),
            threshold,
            direction,
            state,
        })
    }

    /// Line form without the trailing newline.
    pub fn serialize(&self) -> String {
        format!(
            "{}|{}|{}|{}|{:.6}|{}",
            self.state, self.owner, self.created_at, self.asset, self.threshold, self.direction
        )
    }

    /// Strict crossing test; a price equal to the threshold never matches.
    pub fn matches(&self, current_price: f64) -> bool {
        match self.direction {
            Direction::Above => current_price > self.threshold,
            Direction::Below => current_price < self.threshold,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == RuleState::Active
    }

    pub fn close(&mut self) {
        self.state = RuleState::Closed;
    }
}

fn check_field(name: &'static str, value: &str) -> Result<(), RuleError> {
    if value.contains([DELIMITER, '\n', '\r']) {
        return Err(RuleError::ReservedCharacter(name));
    }
    Ok(())
}

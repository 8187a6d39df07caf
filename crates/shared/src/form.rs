//! Typed form-field descriptions.
//!
//! Every input a view renders is described by a [`FieldSpec`] whose
//! [`FieldKind`] carries the configuration that only makes sense for that kind
//! of input. Checking a raw value applies the same constraints a browser form
//! applies natively (required, numeric min/step, option membership) and
//! nothing more.

/// One choice of a select input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOption {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text { multiline: bool },
    Number { min: Option<f64>, step: Option<f64> },
    Select { options: &'static [SelectOption] },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be a number")]
    NotANumber { field: &'static str },

    #[error("{field} must be at least {min}")]
    BelowMin { field: &'static str, min: f64 },

    #[error("{field} must be a multiple of {step}")]
    StepMismatch { field: &'static str, step: f64 },

    #[error("{value:?} is not a valid choice for {field}")]
    NotAnOption { field: &'static str, value: String },

    #[error("unknown field: {0}")]
    UnknownField(String),
}

const STEP_EPSILON: f64 = 1e-9;

impl FieldSpec {
    pub const fn text(name: &'static str, label: &'static str, required: bool) -> Self {
        Self {
            name,
            label,
            required,
            kind: FieldKind::Text { multiline: false },
        }
    }

    pub const fn text_area(name: &'static str, label: &'static str, required: bool) -> Self {
        Self {
            name,
            label,
            required,
            kind: FieldKind::Text { multiline: true },
        }
    }

    pub const fn number(
        name: &'static str,
        label: &'static str,
        required: bool,
        min: Option<f64>,
        step: Option<f64>,
    ) -> Self {
        Self {
            name,
            label,
            required,
            kind: FieldKind::Number { min, step },
        }
    }

    pub const fn select(
        name: &'static str,
        label: &'static str,
        required: bool,
        options: &'static [SelectOption],
    ) -> Self {
        Self {
            name,
            label,
            required,
            kind: FieldKind::Select { options },
        }
    }

    /// Check a raw input value against this field's constraints.
    ///
    /// An empty value passes when the field is optional.
    pub fn check(&self, raw: &str) -> Result<(), FieldError> {
        if raw.is_empty() {
            return if self.required {
                Err(FieldError::Missing { field: self.name })
            } else {
                Ok(())
            };
        }

        match self.kind {
            FieldKind::Text { .. } => Ok(()),
            FieldKind::Number { min, step } => {
                let value: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| FieldError::NotANumber { field: self.name })?;
                if !value.is_finite() {
                    return Err(FieldError::NotANumber { field: self.name });
                }
                if let Some(min) = min {
                    if value < min {
                        return Err(FieldError::BelowMin {
                            field: self.name,
                            min,
                        });
                    }
                }
                if let Some(step) = step {
                    let base = min.unwrap_or(0.0);
                    let steps = (value - base) / step;
                    if (steps - steps.round()).abs() > STEP_EPSILON * steps.abs().max(1.0) {
                        return Err(FieldError::StepMismatch {
                            field: self.name,
                            step,
                        });
                    }
                }
                Ok(())
            }
            FieldKind::Select { options } => {
                if options.iter().any(|o| o.value == raw) {
                    Ok(())
                } else {
                    Err(FieldError::NotAnOption {
                        field: self.name,
                        value: raw.to_string(),
                    })
                }
            }
        }
    }
}

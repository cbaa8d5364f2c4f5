//! Input validation for template and region edits

use thiserror::Error;

use crate::region::{Region, RegionCoordinates};

/// Maximum template name length (characters)
pub const MAX_TEMPLATE_NAME_LEN: usize = 50;

/// Maximum region name length (characters)
pub const MAX_REGION_NAME_LEN: usize = 30;

/// Field a validation error belongs to, for inline reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TemplateName,
    RegionName,
    Coordinates,
    Regions,
}

/// Validation failure. Non-fatal: blocks only the action being submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a template name")]
    EmptyTemplateName,
    #[error("Template name must be {max} characters or fewer")]
    TemplateNameTooLong { max: usize },
    #[error("Please enter a region name")]
    EmptyRegionName,
    #[error("Region name must be {max} characters or fewer")]
    RegionNameTooLong { max: usize },
    #[error("Coordinates must be 0 or greater")]
    NegativeCoordinates,
    #[error("Width and height must be greater than 0")]
    EmptyRegionSize,
    #[error("Select at least one region")]
    NoRegions,
}

impl ValidationError {
    /// The field to flag in the UI
    pub fn field(&self) -> Field {
        match self {
            ValidationError::EmptyTemplateName | ValidationError::TemplateNameTooLong { .. } => {
                Field::TemplateName
            }
            ValidationError::EmptyRegionName | ValidationError::RegionNameTooLong { .. } => {
                Field::RegionName
            }
            ValidationError::NegativeCoordinates | ValidationError::EmptyRegionSize => {
                Field::Coordinates
            }
            ValidationError::NoRegions => Field::Regions,
        }
    }
}

pub fn validate_template_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyTemplateName);
    }
    if name.chars().count() > MAX_TEMPLATE_NAME_LEN {
        return Err(ValidationError::TemplateNameTooLong {
            max: MAX_TEMPLATE_NAME_LEN,
        });
    }
    Ok(())
}

pub fn validate_region_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyRegionName);
    }
    if name.chars().count() > MAX_REGION_NAME_LEN {
        return Err(ValidationError::RegionNameTooLong {
            max: MAX_REGION_NAME_LEN,
        });
    }
    Ok(())
}

pub fn validate_region_coordinates(coords: &RegionCoordinates) -> Result<(), ValidationError> {
    if coords.x < 0.0 || coords.y < 0.0 {
        return Err(ValidationError::NegativeCoordinates);
    }
    if coords.width <= 0.0 || coords.height <= 0.0 {
        return Err(ValidationError::EmptyRegionSize);
    }
    Ok(())
}

/// Regions of a template about to be saved: at least one, each valid
pub fn validate_regions(regions: &[Region]) -> Result<(), ValidationError> {
    if regions.is_empty() {
        return Err(ValidationError::NoRegions);
    }
    for region in regions {
        validate_region_name(&region.name)?;
        validate_region_coordinates(&region.coordinates)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_name_length_boundary() {
        let fifty = "a".repeat(50);
        let fifty_one = "a".repeat(51);

        assert!(validate_template_name(&fifty).is_ok());

        let err = validate_template_name(&fifty_one).unwrap_err();
        assert_eq!(err, ValidationError::TemplateNameTooLong { max: 50 });
        assert_eq!(err.to_string(), "Template name must be 50 characters or fewer");
        assert_eq!(err.field(), Field::TemplateName);
    }

    #[test]
    fn test_template_name_counts_characters() {
        // Multi-byte names are measured in characters, not bytes
        let name = "アンケート".repeat(10);
        assert_eq!(name.chars().count(), 50);
        assert!(validate_template_name(&name).is_ok());
    }

    #[test]
    fn test_template_name_blank() {
        assert_eq!(
            validate_template_name("   "),
            Err(ValidationError::EmptyTemplateName)
        );
    }

    #[test]
    fn test_region_name() {
        assert!(validate_region_name("Name").is_ok());
        assert_eq!(validate_region_name(""), Err(ValidationError::EmptyRegionName));
        assert_eq!(
            validate_region_name(&"x".repeat(31)),
            Err(ValidationError::RegionNameTooLong { max: 30 })
        );
    }

    #[test]
    fn test_region_coordinates() {
        assert!(validate_region_coordinates(&RegionCoordinates::new(0.0, 0.0, 0.5, 0.5)).is_ok());
        assert_eq!(
            validate_region_coordinates(&RegionCoordinates::new(-0.1, 0.0, 0.5, 0.5)),
            Err(ValidationError::NegativeCoordinates)
        );
        let err = validate_region_coordinates(&RegionCoordinates::new(0.1, 0.1, 0.0, 0.5)).unwrap_err();
        assert_eq!(err, ValidationError::EmptyRegionSize);
        assert_eq!(err.field(), Field::Coordinates);
    }

    #[test]
    fn test_regions_required() {
        let err = validate_regions(&[]).unwrap_err();
        assert_eq!(err, ValidationError::NoRegions);
        assert_eq!(err.field(), Field::Regions);

        let valid = vec![Region::new("Name", RegionCoordinates::new(0.1, 0.1, 0.2, 0.2), 1)];
        assert!(validate_regions(&valid).is_ok());

        let blank = vec![Region::new(" ", RegionCoordinates::new(0.1, 0.1, 0.2, 0.2), 1)];
        assert_eq!(validate_regions(&blank), Err(ValidationError::EmptyRegionName));
    }
}

//! Explicit or implicit authorisation.
//!
//! With an explicit flow the TPP starts each authorisation as a separate resource; with an implicit one the
//! authorisation is created together with the consent or payment. The choice is made once, when the authorisation is
//! created.

/// The TPP asked for an explicit flow and the bank supports signing baskets.
pub fn is_explicit(tpp_explicit_preferred: bool, signing_basket_supported: bool) -> bool {
    tpp_explicit_preferred && signing_basket_supported
}

/// Multilevel SCA always needs explicit authorisations, one per PSU.
pub fn is_explicit_for_multilevel(
    multilevel_sca_required: bool,
    tpp_explicit_preferred: bool,
    signing_basket_supported: bool,
) -> bool {
    multilevel_sca_required || is_explicit(tpp_explicit_preferred, signing_basket_supported)
}

pub fn is_implicit(tpp_explicit_preferred: bool, signing_basket_supported: bool) -> bool {
    !is_explicit(tpp_explicit_preferred, signing_basket_supported)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn explicit_needs_both() {
        assert!(is_explicit(true, true));
        assert!(!is_explicit(true, false));
        assert!(!is_explicit(false, true));
        assert!(!is_explicit(false, false));
        assert!(is_implicit(true, false));
    }

    #[test]
    fn multilevel_forces_explicit() {
        assert!(is_explicit_for_multilevel(true, false, false));
        assert!(is_explicit_for_multilevel(false, true, true));
        assert!(!is_explicit_for_multilevel(false, true, false));
    }
}

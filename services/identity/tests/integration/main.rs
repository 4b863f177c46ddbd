/// Expand every contract check into a `#[tokio::test]` against the store
/// built by `$make`.
macro_rules! contract_tests {
    ($make:path) => {
        contract_tests!(@tests $make;
            should_supersede_previous_link_of_same_kind => link_supersession,
            should_keep_links_of_other_kinds_active => link_kinds_are_independent,
            should_hide_expired_links => expired_link_is_unusable,
            should_hide_consumed_links => consumed_link_is_unusable,
            should_rotate_token_on_same_session => token_rotation,
            should_deactivate_and_delete_tokens => token_logout,
            should_reject_moving_token_onto_taken_session => token_session_clash,
            should_discard_all_writes_on_rollback => rollback_discards_all_writes,
            should_expose_all_writes_after_commit => commit_makes_all_writes_visible,
            should_roll_back_nested_unit_only => nested_rollback_keeps_outer_work,
            should_return_empty_profile_page => empty_profile_page,
            should_round_trip_profile_data => profile_data_round_trip,
            should_replace_profile_fields_on_update => profile_update_replaces_fields,
            should_write_nothing_when_profile_data_unserializable => unserializable_profile_data_writes_nothing,
            should_allow_one_profile_per_user => one_profile_per_user,
            should_decode_profile_data_into_caller_type => typed_profile_data,
            should_reject_duplicate_live_login => duplicate_login_is_conflict,
            should_replace_user_fields_on_update => update_user_replaces_fields,
            should_free_login_on_soft_delete => soft_delete_frees_login,
            should_stamp_profile_and_kill_tokens_on_blacklist => blacklist_user_stamps_profile_and_kills_tokens,
            should_report_missing_rows_as_not_found => missing_rows_are_not_found,
            should_bind_and_look_up_accounts => bound_accounts,
            should_blacklist_and_unblacklist_domain => domain_blacklist,
            should_page_blacklisted_domains_in_order => domain_pages_are_ordered,
            should_abort_on_interrupted_context => interrupted_context_aborts,
        );
    };
    (@tests $make:path; $($name:ident => $check:ident,)*) => {
        $(
            #[tokio::test]
            async fn $name() {
                let store = $make().await;
                crate::contract::$check(&store).await;
            }
        )*
    };
}

mod contract;
mod helpers;

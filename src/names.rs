//! Names of the meter and alarm slots defined by the protocol.
//!
//! Both tables are indexed by the slot number the device uses in its
//! identification block maps.

pub const OUTPUT_VA: usize = 23;
pub const LOAD_CURRENT_PHASE_A: usize = 65;
pub const LOAD_CURRENT_PHASE_A_BAR_CHART: usize = 68;
pub const OUTPUT_VA_BAR_CHART: usize = 71;

pub const ALARM_BATTERY_LOW: usize = 56;
pub const ALARM_BATTERY_NEEDS_SERVICE: usize = 149;
pub const ALARM_UPS_ON_BATTERY: usize = 168;
pub const ALARM_BATTERY_TEST_FAILED: usize = 191;

/// Meter slot names, by meter map index.
pub const METER_NAMES: [&str; 129] = [
    "output_volts_ab",
    "output_volts_bc",
    "output_volts_ca",
    "input_volts_ab",
    "input_volts_bc",
    "input_volts_ca",
    "inverter_volts_ab",
    "inverter_volts_bc",
    "inverter_volts_ca",
    "bypass_volts_ab",
    "bypass_volts_bc",
    "bypass_volts_ca",
    "main_logic_power",
    "secondary_v_plus_power",
    "secondary_v_minus_power",
    "inverter_avg_current_phase_a",
    "inverter_avg_current_phase_b",
    "inverter_avg_current_phase_c",
    "input_current_phase_a",
    "input_current_phase_b",
    "input_current_phase_c",
    "output_watts",
    "input_watts",
    "output_va",
    "input_va",
    "output_power_factor",
    "input_power_factor",
    "output_frequency",
    "input_frequency",
    "inverter_frequency",
    "bypass_frequency",
    "dc_link_volts_dc",
    "battery_current",
    "battery_voltage",
    "percent_battery_left",
    "battery_time_remaining",
    "battery_charge_time",
    "peak_inverter_current_phase_a",
    "peak_inverter_current_phase_b",
    "peak_inverter_current_phase_c",
    "avg_input_current_3_phase_sum",
    "battery_dcuv_bar_chart",
    "input_current_bar_chart",
    "low_battery_warning_v_bar_chart",
    "dc_volts_bar_chart",
    "battery_charging_current_bar_chart",
    "battery_discharging_current_bar_chart",
    "percent_load_phase_a",
    "percent_load_phase_b",
    "percent_load_phase_c",
    "output_va_phase_a",
    "output_va_phase_b",
    "output_va_phase_c",
    "bypass_volts_phase_a",
    "bypass_volts_phase_b",
    "bypass_volts_phase_c",
    "input_volts_phase_a",
    "input_volts_phase_b",
    "input_volts_phase_c",
    "inverter_volts_phase_a",
    "inverter_volts_phase_b",
    "inverter_volts_phase_c",
    "ambient_temperature",
    "heatsink_temperature",
    "power_supply_temperature",
    "load_current_phase_a",
    "load_current_phase_b",
    "load_current_phase_c",
    "load_current_phase_a_bar_chart",
    "load_current_phase_b_bar_chart",
    "load_current_phase_c_bar_chart",
    "output_va_bar_chart",
    "date",
    "time",
    "positive_dc_link_rail_voltage",
    "negative_dc_link_rail_voltage",
    "auto_balance_voltage_dc",
    "battery_temperature",
    "output_volts_a",
    "output_volts_b",
    "output_volts_c",
    "neutral_current",
    "output_watts_phase_a",
    "output_watts_phase_b",
    "output_watts_phase_c",
    "output_watts_phase_a_b_c_bar_chart",
    "rectifier_dc_current",
    "positive_battery_voltage",
    "negative_battery_voltage",
    "positive_battery_current",
    "negative_battery_current",
    "line_event_counter",
    "output_v1_percent",
    "output_v2_percent",
    "output_v3_percent",
    "output_i1_percent",
    "output_i2_percent",
    "output_i3_percent",
    "input_v1_percent",
    "input_v2_percent",
    "input_v3_percent",
    "input_i1_percent",
    "input_i2_percent",
    "input_i3_percent",
    "ground_current",
    "output_crest_factor_l1",
    "output_crest_factor_l2",
    "output_crest_factor_l3",
    "output_kw_hour",
    "input_voltage_thd_line1",
    "input_voltage_thd_line2",
    "input_voltage_thd_line3",
    "input_current_thd_line1",
    "input_current_thd_line2",
    "input_current_thd_line3",
    "output_voltage_thd_line1",
    "output_voltage_thd_line2",
    "output_voltage_thd_line3",
    "output_current_thd_line1",
    "output_current_thd_line2",
    "output_current_thd_line3",
    "input_crest_factor_l1",
    "input_crest_factor_l2",
    "input_crest_factor_l3",
    "input_kw_hour",
    "battery_life_remaining",
    "secondary_neutral_current",
    "secondary_ground_current",
    "hours_of_operation",
];

/// Alarm slot names, by alarm map index. Unassigned slots are `None`.
pub const ALARM_NAMES: [Option<&str>; 259] = [
    Some("inverter_ac_over_voltage"),
    Some("inverter_ac_under_voltage"),
    Some("inverter_over_or_under_freq"),
    Some("bypass_ac_over_voltage"),
    Some("bypass_ac_under_voltage"),
    Some("bypass_over_or_under_freq"),
    Some("input_ac_over_voltage"),
    Some("input_ac_under_voltage"),
    Some("input_under_or_over_freq"),
    Some("output_over_voltage"),
    Some("output_under_voltage"),
    Some("output_under_or_over_freq"),
    Some("remote_emergency_pwr_off"),
    Some("remote_go_to_bypass"),
    Some("building_alarm_6"),
    Some("building_alarm_5"),
    Some("building_alarm_4"),
    Some("building_alarm_3"),
    Some("building_alarm_2"),
    Some("building_alarm_1"),
    Some("static_switch_over_temp"),
    Some("charger_over_temp"),
    Some("charger_logic_pwr_fail"),
    Some("charger_over_voltage_or_current"),
    Some("inverter_over_temp"),
    Some("output_overload"),
    Some("rectifier_input_over_current"),
    Some("inverter_output_over_current"),
    Some("dc_link_over_voltage"),
    Some("dc_link_under_voltage"),
    Some("rectifier_failed"),
    Some("inverter_fault"),
    Some("battery_connector_fail"),
    Some("bypass_breaker_fail"),
    Some("charger_fail"),
    Some("ramp_up_failed"),
    Some("static_switch_failed"),
    Some("analog_ad_ref_fail"),
    Some("bypass_uncalibrated"),
    Some("rectifier_uncalibrated"),
    Some("output_uncalibrated"),
    Some("inverter_uncalibrated"),
    Some("dc_volt_uncalibrated"),
    Some("output_current_uncalibrated"),
    Some("rectifier_current_uncalibrated"),
    Some("battery_current_uncalibrated"),
    Some("inverter_on_off_stat_fail"),
    Some("battery_current_limit"),
    Some("inverter_startup_fail"),
    Some("analog_board_ad_stat_fail"),
    Some("output_current_over_100"),
    Some("battery_ground_fault"),
    Some("waiting_for_charger_sync"),
    Some("nv_ram_fail"),
    Some("analog_board_ad_timeout"),
    Some("shutdown_imminent"),
    Some("battery_low"),
    Some("utility_fail"),
    Some("output_short_circuit"),
    Some("utility_not_present"),
    Some("full_time_charging"),
    Some("fast_bypass_command"),
    Some("ad_error"),
    Some("internal_com_fail"),
    Some("rectifier_selftest_fail"),
    Some("rectifier_eeprom_fail"),
    Some("rectifier_eprom_fail"),
    Some("input_line_voltage_loss"),
    Some("battery_dc_over_voltage"),
    Some("power_supply_over_temp"),
    Some("power_supply_fail"),
    Some("power_supply_5v_fail"),
    Some("power_supply_12v_fail"),
    Some("heatsink_over_temp"),
    Some("heatsink_temp_sensor_fail"),
    Some("rectifier_current_over_125"),
    Some("rectifier_fault_interrupt_fail"),
    Some("rectifier_power_capasitor_fail"),
    Some("inverter_program_stack_error"),
    Some("inverter_board_selftest_fail"),
    Some("inverter_ad_selftest_fail"),
    Some("inverter_ram_selftest_fail"),
    Some("nv_memory_checksum_fail"),
    Some("program_checksum_fail"),
    Some("inverter_cpu_selftest_fail"),
    Some("network_not_responding"),
    Some("front_panel_selftest_fail"),
    Some("node_eeprom_verification_error"),
    Some("output_ac_over_volt_test_fail"),
    Some("output_dc_over_voltage"),
    Some("input_phase_rotation_error"),
    Some("inverter_ramp_up_test_failed"),
    Some("inverter_off_command"),
    Some("inverter_on_command"),
    Some("to_bypass_command"),
    Some("from_bypass_command"),
    Some("auto_mode_command"),
    Some("emergency_shutdown_command"),
    Some("setup_switch_open"),
    Some("inverter_over_volt_int"),
    Some("inverter_under_volt_int"),
    Some("absolute_dcov_acov"),
    Some("phase_a_current_limit"),
    Some("phase_b_current_limit"),
    Some("phase_c_current_limit"),
    Some("bypass_not_available"),
    Some("rectifier_breaker_open"),
    Some("battery_contactor_open"),
    Some("inverter_contactor_open"),
    Some("bypass_breaker_open"),
    Some("inv_board_acov_int_test_fail"),
    Some("inverter_over_temp_trip"),
    Some("inv_board_acuv_int_test_fail"),
    Some("inverter_voltage_feedback_error"),
    Some("dc_under_voltage_timeout"),
    Some("ac_under_voltage_timeout"),
    Some("dc_under_voltage_while_charge"),
    Some("inverter_voltage_bias_error"),
    Some("rectifier_phase_rotation"),
    Some("bypass_phaser_rotation"),
    Some("system_interface_board_fail"),
    Some("parallel_board_fail"),
    Some("lost_load_sharing_phase_a"),
    Some("lost_load_sharing_phase_b"),
    Some("lost_load_sharing_phase_c"),
    Some("dc_over_voltage_timeout"),
    Some("battery_totally_discharged"),
    Some("inverter_phase_bias_error"),
    Some("inverter_voltage_bias_error_2"),
    Some("dc_link_bleed_complete"),
    Some("large_charger_input_current"),
    Some("inv_volt_too_low_for_ramp_level"),
    Some("loss_of_redundancy"),
    Some("loss_of_sync_bus"),
    Some("rectifier_breaker_shunt_trip"),
    Some("loss_of_charger_sync"),
    Some("inverter_low_level_test_timeout"),
    Some("output_breaker_open"),
    Some("control_power_on"),
    Some("inverter_on"),
    Some("charger_on"),
    Some("bypass_on"),
    Some("bypass_power_loss"),
    Some("on_manual_bypass"),
    Some("bypass_manual_turn_off"),
    Some("inverter_bleeding_dc_link_volt"),
    Some("cpu_isr_error"),
    Some("system_isr_restart"),
    Some("parallel_dc"),
    Some("battery_needs_service"),
    Some("battery_charging"),
    Some("battery_not_charged"),
    Some("disabled_battery_time"),
    Some("series_7000_enable"),
    Some("other_ups_on"),
    Some("parallel_inverter"),
    Some("ups_in_parallel"),
    Some("output_breaker_realy_fail"),
    Some("control_power_off"),
    Some("level_2_overload_phase_a"),
    Some("level_2_overload_phase_b"),
    Some("level_2_overload_phase_c"),
    Some("level_3_overload_phase_a"),
    Some("level_3_overload_phase_b"),
    Some("level_3_overload_phase_c"),
    Some("level_4_overload_phase_a"),
    Some("level_4_overload_phase_b"),
    Some("level_4_overload_phase_c"),
    Some("ups_on_battery"),
    Some("ups_on_bypass"),
    Some("load_dumped"),
    Some("load_on_inverter"),
    Some("ups_on_command"),
    Some("ups_off_command"),
    Some("low_battery_shutdown"),
    Some("auto_on_enabled"),
    Some("software_incompability_detected"),
    Some("inverter_temp_sensor_failed"),
    Some("dc_start_occured"),
    Some("in_parallel_operation"),
    Some("syncing_to_bypass"),
    Some("ramping_ups_up"),
    Some("inverter_on_delay"),
    Some("charger_on_delay"),
    Some("waiting_for_util_input"),
    Some("close_bypass_breaker"),
    Some("temporary_bypass_operation"),
    Some("syncing_to_output"),
    Some("bypass_failure"),
    Some("auto_off_command_executed"),
    Some("auto_on_command_executed"),
    Some("battery_test_failed"),
    Some("fuse_fail"),
    Some("fan_fail"),
    Some("site_wiring_fault"),
    Some("backfeed_contactor_fail"),
    Some("on_buck"),
    Some("on_boost"),
    Some("on_double_boost"),
    Some("batteries_disconnected"),
    Some("ups_cabinet_over_temp"),
    Some("transformer_over_temp"),
    Some("ambient_under_temp"),
    Some("ambient_over_temp"),
    Some("cabinet_door_open"),
    Some("cabinet_door_open_volt_present"),
    Some("auto_shutdown_pending"),
    Some("tap_switching_realy_pending"),
    Some("unable_to_charge_batteries"),
    Some("startup_failure_check_epo"),
    Some("automatic_startup_pending"),
    Some("modem_failed"),
    Some("incoming_modem_call_started"),
    Some("outgoing_modem_call_started"),
    Some("modem_connection_established"),
    Some("modem_call_completed_success"),
    Some("modem_call_completed_fail"),
    Some("input_breaker_fail"),
    Some("sysinit_in_progress"),
    Some("autocalibration_fail"),
    Some("selective_trip_of_module"),
    Some("inverter_output_failure"),
    Some("abnormal_output_volt_at_startup"),
    Some("rectifier_over_temp"),
    Some("config_error"),
    Some("redundancy_loss_due_to_overload"),
    Some("on_alternate_ac_source"),
    Some("in_high_efficiency_mode"),
    Some("system_notice_active"),
    Some("system_alarm_active"),
    Some("alternate_power_source_not_available"),
    Some("current_balance_failure"),
    Some("check_air_filter"),
    Some("subsystem_notice_active"),
    Some("subsystem_alarm_active"),
    Some("charger_on_command"),
    Some("charger_off_command"),
    Some("ups_normal"),
    Some("inverter_phase_rotation"),
    Some("ups_off"),
    Some("external_communication_failure"),
    None, // 241
    None, // 242
    None, // 243
    None, // 244
    None, // 245
    None, // 246
    None, // 247
    None, // 248
    None, // 249
    None, // 250
    None, // 251
    None, // 252
    None, // 253
    None, // 254
    None, // 255
    Some("battery_test_inprogress"),
    Some("system_test_inprogress"),
    Some("battery_test_aborted"),
];

//! Vertical cards and compact tables for the terminal.

use jamal_core::format::{format_brl, format_phone};
use jamal_core::geo::navigation_url;
use jamal_core::{Destination, Driver, Notification, Payment, RankedRequest, RideRequest};
use jamal_dispatch::DashboardReport;

const MAX_LIST_ITEMS: usize = 10;

fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<26} {}", label, value);
}

fn opt_field(label: &str, value: Option<impl std::fmt::Display>) {
    if let Some(v) = value {
        field(label, v);
    }
}

// ── Cards ──

pub fn print_driver_card(driver: &Driver) {
    println!("=== {} ({}) ===", driver.name, driver.code);
    field("id", driver.id);
    field("telefone", format_phone(&driver.phone));
    field("veiculo", &driver.vehicle);
    field("placa", &driver.plate);
    field("status", driver.status);
    field("ativo", if driver.active { "sim" } else { "não" });
    field("avaliacao", format!("{:.1}", driver.rating));
    opt_field("avaliacoes_total", driver.rating_count);
    field("corridas", driver.rides);
    if let Some(p) = driver.position() {
        field("posicao", format!("{:.5}, {:.5}", p.latitude, p.longitude));
    }
    println!();
}

pub fn print_ride_card(ride: &RideRequest) {
    println!("=== Corrida #{} ===", ride.id);
    field("status", ride.status);
    field("solicitada em", ride.timestamp.format("%d/%m/%Y %H:%M"));
    opt_field("destino", ride.destination.as_deref());
    println!();

    println!("Cliente");
    field("nome", &ride.client.name);
    field("telefone", format_phone(&ride.client.phone));
    field("embarque", &ride.client.address);
    println!();

    let d = &ride.driver;
    if !d.is_empty() {
        println!("Motorista");
        opt_field("nome", d.name.as_deref());
        opt_field("veiculo", d.vehicle.as_deref());
        opt_field("placa", d.plate.as_deref());
        opt_field("telefone", d.phone.as_deref().map(format_phone));
        opt_field("tempo estimado (min)", d.eta_minutes);
        if let Some(at) = d.arrived_at.filter(|_| d.has_arrived()) {
            field("chegou", at.format("%H:%M"));
        }
        println!();
    }

    if ride.fare.is_some() || ride.distance_km.is_some() {
        println!("Valores");
        opt_field("distancia (km)", ride.distance_km.map(|km| format!("{km:.1}")));
        opt_field("valor", ride.fare.map(format_brl));
        opt_field("tempo de resposta (s)", ride.response_seconds);
        opt_field("avaliacao", ride.rating);
        println!();
    }
}

// ── Tables ──

pub fn print_drivers(drivers: &[Driver]) {
    println!(
        "{:>4}  {:<6}  {:<20}  {:<8}  {:<5}  {:>5}  {:>8}",
        "id", "codigo", "nome", "status", "ativo", "nota", "corridas"
    );
    for d in drivers {
        println!(
            "{:>4}  {:<6}  {:<20}  {:<8}  {:<5}  {:>5.1}  {:>8}",
            d.id,
            d.code,
            truncate(&d.name, 20),
            d.status,
            if d.active { "sim" } else { "não" },
            d.rating,
            d.rides
        );
    }
    println!("{} motorista(s)", drivers.len());
}

pub fn print_destinations(destinations: &[Destination]) {
    for d in destinations {
        let flag = if d.active { " " } else { "x" };
        println!("{:>4} [{}] {:<24} {}", d.id, flag, truncate(&d.name, 24), d.address);
    }
    if destinations.is_empty() {
        println!("  (nenhum destino)");
    }
}

pub fn print_queue(queue: &[RankedRequest]) {
    if queue.is_empty() {
        println!("  Nenhuma solicitação pendente.");
        return;
    }
    for r in queue.iter().take(MAX_LIST_ITEMS) {
        let ride = &r.request;
        println!(
            "  #{:<5} {:>6.1} km  {:<20} → {}",
            ride.id,
            r.pickup_km,
            truncate(&ride.client.name, 20),
            ride.destination.as_deref().unwrap_or("-")
        );
        println!("         {}", ride.client.address);
        println!(
            "         {}",
            navigation_url(ride.client.coordinates, &ride.client.address)
        );
    }
    if queue.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", queue.len() - MAX_LIST_ITEMS);
    }
}

pub fn print_payments(payments: &[Payment]) {
    println!(
        "{:>4}  {:<20}  {:>5}  {:>12}  {:>12}  {:>12}  {:<11}  {:<23}",
        "id", "motorista", "corr.", "bruto", "comissão", "líquido", "status", "período"
    );
    for p in payments {
        println!(
            "{:>4}  {:<20}  {:>5}  {:>12}  {:>12}  {:>12}  {:<11}  {} a {}",
            p.id,
            truncate(&p.driver_name, 20),
            p.ride_count,
            format_brl(p.gross),
            format_brl(p.commission),
            format_brl(p.net),
            p.status,
            p.period_start.format("%d/%m/%Y"),
            p.period_end.format("%d/%m/%Y"),
        );
    }
}

pub fn print_notifications(notifications: &[Notification]) {
    if notifications.is_empty() {
        println!("  Nenhuma notificação.");
        return;
    }
    for n in notifications {
        let mark = if n.read { " " } else { "*" };
        println!("{mark} [{}] {}", n.time.format("%d/%m %H:%M"), n.title);
        println!("    {}", n.message);
        println!("    id: {}", n.id);
    }
}

pub fn print_dashboard(report: &DashboardReport, rides_shown: &[&RideRequest]) {
    let s = &report.stats;
    println!(
        "=== Dashboard ({} desde {}) ===",
        report.period,
        report.since.format("%d/%m/%Y")
    );
    println!();
    println!("Solicitações");
    field("total", s.total);
    field("pendentes", s.pending);
    field("aceitas", s.accepted);
    field("recusadas", s.refused);
    field("canceladas", s.cancelled);
    field("finalizadas", s.completed);
    field("motoristas ativos", s.active_drivers);
    field("tempo médio resposta (s)", s.average_response_seconds);
    println!();

    println!("Financeiro");
    field("faturamento", format_brl(s.revenue));
    field("comissão", format_brl(s.commission));
    field("pagamento motoristas", format_brl(s.driver_payouts));
    field("ticket médio", format_brl(s.average_ticket));
    println!();

    if !report.drivers.is_empty() {
        println!("Motoristas");
        for d in report.drivers.iter().take(MAX_LIST_ITEMS) {
            println!(
                "  {:<20} {:>3} corridas  {:>3} finalizadas  {:>3} canceladas  {:>6.0}s  {}",
                truncate(&d.name, 20),
                d.total,
                d.completed,
                d.cancelled,
                d.average_response_seconds,
                format_brl(d.revenue)
            );
        }
        println!();
    }

    if !report.monthly.is_empty() {
        println!("Por mês");
        for m in &report.monthly {
            println!(
                "  {}  {:>12}  {:>12}  {:>12}",
                m.month,
                format_brl(m.revenue),
                format_brl(m.commission),
                format_brl(m.payout)
            );
        }
        println!();
    }

    println!("Corridas ({})", rides_shown.len());
    for r in rides_shown.iter().take(MAX_LIST_ITEMS) {
        println!(
            "  #{:<5} {}  {:<22}  {:<20} {}",
            r.id,
            r.timestamp.format("%d/%m %H:%M"),
            r.status,
            truncate(&r.client.name, 20),
            r.destination.as_deref().unwrap_or("-")
        );
    }
    if rides_shown.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", rides_shown.len() - MAX_LIST_ITEMS);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("São Paulo", 20), "São Paulo");
        assert_eq!(truncate("Aeroporto de Guarulhos", 12), "Aeroporto...");
        assert_eq!(truncate("çççç", 3), "...");
    }
}

/// Backend table names.
pub mod tables {
    pub const DRIVERS: &str = "drivers";
    pub const RIDES: &str = "solicitacoes";
    pub const DESTINATIONS: &str = "destinos";
    pub const PAYMENTS: &str = "pagamentos";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const RATINGS: &str = "avaliacoes";

    pub const ALL: [&str; 6] = [DRIVERS, RIDES, DESTINATIONS, PAYMENTS, NOTIFICATIONS, RATINGS];
}

/// PostgreSQL DDL for a fresh Supabase project.
///
/// The hosted backend cannot be migrated through its REST surface, so this is
/// printed for an operator to paste into the SQL editor.
pub fn initialization_sql() -> &'static str {
    r#"-- Jamal Express schema: run in the Supabase SQL editor

CREATE TABLE IF NOT EXISTS drivers (
  id SERIAL PRIMARY KEY,
  codigo TEXT NOT NULL UNIQUE,
  nome TEXT NOT NULL,
  telefone TEXT NOT NULL,
  avaliacao DECIMAL(3,1) NOT NULL DEFAULT 5.0,
  avaliacoes_total INTEGER DEFAULT 0,
  veiculo TEXT NOT NULL,
  placa TEXT NOT NULL,
  foto TEXT,
  corridas INTEGER DEFAULT 0,
  status TEXT DEFAULT 'offline',
  ativo BOOLEAN DEFAULT TRUE,
  latitude DOUBLE PRECISION,
  longitude DOUBLE PRECISION,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS notifications (
  id TEXT PRIMARY KEY,
  titulo TEXT NOT NULL,
  mensagem TEXT NOT NULL,
  tempo TIMESTAMP WITH TIME ZONE NOT NULL,
  lida BOOLEAN DEFAULT FALSE,
  driver_code TEXT,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS solicitacoes (
  id SERIAL PRIMARY KEY,
  cliente JSONB NOT NULL,
  motorista JSONB NOT NULL DEFAULT '{}'::jsonb,
  destino TEXT,
  status TEXT NOT NULL DEFAULT 'pendente',
  timestamp TIMESTAMP WITH TIME ZONE NOT NULL,
  valor DECIMAL(10,2),
  distancia DOUBLE PRECISION,
  tempo_resposta INTEGER,
  avaliacao DECIMAL(3,1),
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS destinos (
  id SERIAL PRIMARY KEY,
  nome TEXT NOT NULL,
  endereco TEXT NOT NULL,
  latitude DOUBLE PRECISION,
  longitude DOUBLE PRECISION,
  ativo BOOLEAN DEFAULT TRUE,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS pagamentos (
  id SERIAL PRIMARY KEY,
  motorista_id INTEGER NOT NULL REFERENCES drivers(id) ON DELETE CASCADE,
  motorista_nome TEXT NOT NULL,
  total_corridas INTEGER NOT NULL,
  valor_bruto DECIMAL(10,2) NOT NULL,
  comissao_app DECIMAL(10,2) NOT NULL,
  valor_liquido DECIMAL(10,2) NOT NULL,
  data_inicio TIMESTAMP WITH TIME ZONE NOT NULL,
  data_fim TIMESTAMP WITH TIME ZONE NOT NULL,
  status TEXT NOT NULL DEFAULT 'pendente',
  data_pagamento TIMESTAMP WITH TIME ZONE,
  metodo_pagamento TEXT,
  observacoes TEXT,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS avaliacoes (
  id SERIAL PRIMARY KEY,
  motorista_id INTEGER NOT NULL REFERENCES drivers(id) ON DELETE CASCADE,
  estrelas INTEGER NOT NULL CHECK (estrelas BETWEEN 1 AND 5),
  comentario TEXT,
  data TIMESTAMP WITH TIME ZONE NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drivers_codigo ON drivers(codigo);
CREATE INDEX IF NOT EXISTS idx_drivers_status ON drivers(status);
CREATE INDEX IF NOT EXISTS idx_notifications_driver ON notifications(driver_code);
CREATE INDEX IF NOT EXISTS idx_solicitacoes_status ON solicitacoes(status);
CREATE INDEX IF NOT EXISTS idx_solicitacoes_timestamp ON solicitacoes(timestamp);
CREATE INDEX IF NOT EXISTS idx_pagamentos_motorista ON pagamentos(motorista_id);
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_creates_every_table() {
        let sql = initialization_sql();
        for table in tables::ALL {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn ride_table_defaults_to_pending() {
        assert!(initialization_sql().contains("status TEXT NOT NULL DEFAULT 'pendente'"));
    }
}
